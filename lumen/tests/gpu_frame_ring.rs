//! Headless GPU checks of the frame ring. They need a Vulkan 1.3 driver, so they only run with
//! `cargo test -- --ignored`.

use lumen::config::FRAME_OVERLAP;
use lumen::rhi::{select_physical_device, ImmediateSubmit, RhiCore};
use lumen::FrameRing;

#[test]
#[ignore = "requires a Vulkan 1.3 device"]
fn immediate_submit_shares_nothing_with_frame_slots() {
    let core = RhiCore::new_headless().expect("Vulkan instance");
    let physical = select_physical_device(core.instance(), None).expect("Vulkan 1.3 device");
    let device = core.create_render_device(&physical).expect("logical device");
    let queue = device.graphics_queue();

    let frames = FrameRing::new(&device, queue, FRAME_OVERLAP).expect("frame ring");
    let immediate = ImmediateSubmit::new(&device, queue).expect("immediate submit");
    assert_eq!(frames.len(), FRAME_OVERLAP);

    for slot in frames.slots() {
        assert_ne!(slot.pool.handle(), immediate.pool().handle());
        assert_ne!(slot.command_buffer, immediate.command_buffer());
        assert_ne!(slot.frame_done.handle(), immediate.fence().handle());
    }

    immediate.submit(&device, |_| {}).expect("immediate submit");
    for slot in frames.slots() {
        assert!(slot.frame_done.is_signaled().unwrap(), "immediate work touched a frame fence");
    }
}
