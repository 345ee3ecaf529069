mod support;

use glam::Vec4;
use lumen::rhi::vk::Handle;
use lumen::rhi::{vk, AcquireOutcome, ImageBlit, PresentStatus, TextureLayout};
use lumen::{ComputePushConstants, FrameError, FrameOrchestrator, FrameOutcome, FrameStep, SkipReason};
use support::{Command, Event, ScriptedBackend, DRAW_TARGET, FIRST_SWAPCHAIN_IMAGE};

fn extent(width: u32, height: u32) -> vk::Extent2D {
    vk::Extent2D { width, height }
}

fn push() -> ComputePushConstants {
    ComputePushConstants::gradient(Vec4::new(1.0, 0.0, 0.0, 1.0), Vec4::new(0.0, 0.0, 1.0, 1.0))
}

fn draw(orchestrator: &mut FrameOrchestrator, backend: &mut ScriptedBackend) -> Result<FrameOutcome, FrameError> {
    let mut overlay = backend.overlay();
    orchestrator.draw(backend, &push(), &mut overlay, "ui")
}

fn transitions(commands: &[Command]) -> Vec<(vk::Image, TextureLayout, TextureLayout)> {
    commands
        .iter()
        .filter_map(|command| match command {
            Command::Transition { image, from, to } => Some((*image, *from, *to)),
            _ => None,
        })
        .collect()
}

#[test]
fn one_frame_records_the_full_sequence() {
    let mut backend = ScriptedBackend::new(2, extent(1920, 1080));
    let mut orchestrator = FrameOrchestrator::new();

    assert_eq!(draw(&mut orchestrator, &mut backend).unwrap(), FrameOutcome::Presented);

    let draw_target = vk::Image::from_raw(DRAW_TARGET);
    let swapchain_image = vk::Image::from_raw(FIRST_SWAPCHAIN_IMAGE);
    let commands = backend.commands();

    assert_eq!(
        transitions(&commands),
        vec![
            (draw_target, TextureLayout::Undefined, TextureLayout::General),
            (draw_target, TextureLayout::General, TextureLayout::TransferSrc),
            (swapchain_image, TextureLayout::Undefined, TextureLayout::TransferDst),
            (swapchain_image, TextureLayout::TransferDst, TextureLayout::Color),
            (swapchain_image, TextureLayout::Color, TextureLayout::Present),
        ]
    );

    let kinds: Vec<&str> = commands
        .iter()
        .map(|command| match command {
            Command::Begin(_) => "begin",
            Command::End => "end",
            Command::Transition { .. } => "transition",
            Command::BindPipeline(..) => "bind_pipeline",
            Command::BindSets(..) => "bind_sets",
            Command::PushConstants { .. } => "push",
            Command::Dispatch(_) => "dispatch",
            Command::Blit(_) => "blit",
            Command::BeginRendering(_) => "begin_rendering",
            Command::EndRendering => "end_rendering",
            Command::Ui { .. } => "ui",
        })
        .collect();
    assert_eq!(
        kinds,
        [
            "begin",
            "transition",
            "bind_pipeline",
            "bind_sets",
            "push",
            "dispatch",
            "transition",
            "transition",
            "blit",
            "transition",
            "begin_rendering",
            "ui",
            "end_rendering",
            "transition",
            "end",
        ]
    );

    assert_eq!(commands[0], Command::Begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT));
    assert_eq!(backend.draw_target.layout(), TextureLayout::TransferSrc);
    assert_eq!(backend.swapchain_images[0].layout(), TextureLayout::Present);
}

#[test]
fn frame_steps_run_in_protocol_order() {
    let mut backend = ScriptedBackend::new(2, extent(800, 600));
    let mut orchestrator = FrameOrchestrator::new();
    draw(&mut orchestrator, &mut backend).unwrap();

    let steps: Vec<Event> = backend
        .events()
        .into_iter()
        .filter(|event| !matches!(event, Event::Cmd { .. }))
        .collect();
    assert_eq!(
        steps,
        [
            Event::Wait(0),
            Event::Reset(0),
            Event::Acquire(0),
            Event::BeginRecord { slot: 0, image_index: 0 },
            Event::Submit(0),
            Event::Present { slot: 0, image_index: 0 },
        ]
    );
    assert_eq!(orchestrator.frame_number(), 1);
}

#[test]
fn dispatch_covers_the_draw_extent() {
    for (size, groups) in [((1920, 1080), [120, 68, 1]), ((1000, 700), [63, 44, 1])] {
        let mut backend = ScriptedBackend::new(2, extent(size.0, size.1));
        let mut orchestrator = FrameOrchestrator::new();
        draw(&mut orchestrator, &mut backend).unwrap();

        let dispatches: Vec<_> = backend
            .commands()
            .into_iter()
            .filter_map(|command| match command {
                Command::Dispatch(counts) => Some(counts),
                _ => None,
            })
            .collect();
        assert_eq!(dispatches, [groups]);
    }
}

#[test]
fn pushed_bytes_match_the_caller_block() {
    let mut backend = ScriptedBackend::new(2, extent(640, 480));
    let mut orchestrator = FrameOrchestrator::new();
    draw(&mut orchestrator, &mut backend).unwrap();

    let expected = push();
    let pushed: Vec<_> = backend
        .commands()
        .into_iter()
        .filter_map(|command| match command {
            Command::PushConstants { stages, offset, bytes } => Some((stages, offset, bytes)),
            _ => None,
        })
        .collect();

    assert_eq!(pushed.len(), 1);
    let (stages, offset, bytes) = &pushed[0];
    assert_eq!(*stages, vk::ShaderStageFlags::COMPUTE);
    assert_eq!(*offset, 0);
    assert_eq!(bytes.len(), 64);
    assert_eq!(bytes.as_slice(), expected.as_bytes());
}

#[test]
fn blit_stretches_draw_target_onto_swapchain_image() {
    let mut backend = ScriptedBackend::new(2, extent(1280, 720));
    backend.draw_extent = extent(1920, 1080);
    let mut orchestrator = FrameOrchestrator::new();
    draw(&mut orchestrator, &mut backend).unwrap();

    let blits: Vec<_> = backend
        .commands()
        .into_iter()
        .filter_map(|command| match command {
            Command::Blit(blit) => Some(blit),
            _ => None,
        })
        .collect();
    assert_eq!(
        blits,
        [ImageBlit {
            src: vk::Image::from_raw(DRAW_TARGET),
            src_extent: extent(1920, 1080),
            dst: vk::Image::from_raw(FIRST_SWAPCHAIN_IMAGE),
            dst_extent: extent(1280, 720),
        }]
    );

    let group_counts = backend.commands().into_iter().find_map(|command| match command {
        Command::Dispatch(counts) => Some(counts),
        _ => None,
    });
    assert_eq!(group_counts, Some([120, 68, 1]));
}

#[test]
fn ui_draws_inside_the_pass_over_the_swapchain_extent() {
    let mut backend = ScriptedBackend::new(2, extent(1024, 768));
    let mut orchestrator = FrameOrchestrator::new();
    draw(&mut orchestrator, &mut backend).unwrap();

    let commands = backend.commands();
    let begin = commands.iter().position(|c| matches!(c, Command::BeginRendering(_))).unwrap();
    let ui = commands.iter().position(|c| matches!(c, Command::Ui { .. })).unwrap();
    let end = commands.iter().position(|c| matches!(c, Command::EndRendering)).unwrap();
    assert!(begin < ui && ui < end);

    match &commands[begin] {
        Command::BeginRendering(target) => {
            assert_eq!(target.view, vk::ImageView::from_raw(200));
            assert_eq!(target.layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
            assert_eq!(target.extent, extent(1024, 768));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(
        commands[ui],
        Command::Ui {
            draw_data: "ui".to_owned(),
            extent: extent(1024, 768),
        }
    );
}

#[test]
fn suboptimal_present_rebuilds_once_before_next_wait() {
    let mut backend = ScriptedBackend::new(2, extent(800, 600));
    backend.present_script.push_back(Ok(PresentStatus::Suboptimal));
    let mut orchestrator = FrameOrchestrator::new();

    backend.window_extent = extent(1024, 768);
    assert_eq!(draw(&mut orchestrator, &mut backend).unwrap(), FrameOutcome::PresentedAndRebuilt);
    assert_eq!(draw(&mut orchestrator, &mut backend).unwrap(), FrameOutcome::Presented);

    let events = backend.events();
    let present = events.iter().position(|e| matches!(e, Event::Present { .. })).unwrap();
    let rebuild = events.iter().position(|e| matches!(e, Event::Rebuild(_))).unwrap();
    let next_wait = events.iter().rposition(|e| matches!(e, Event::Wait(_))).unwrap();

    assert_eq!(backend.rebuild_count(), 1);
    assert_eq!(events[rebuild], Event::Rebuild(extent(1024, 768)));
    assert!(present < rebuild && rebuild < next_wait);
    assert_eq!(orchestrator.frame_number(), 2);
}

#[test]
fn out_of_date_present_is_not_fatal() {
    let mut backend = ScriptedBackend::new(2, extent(800, 600));
    backend.present_script.push_back(Ok(PresentStatus::OutOfDate));
    let mut orchestrator = FrameOrchestrator::new();

    assert_eq!(draw(&mut orchestrator, &mut backend).unwrap(), FrameOutcome::PresentedAndRebuilt);
    assert_eq!(backend.rebuild_count(), 1);
}

#[test]
fn suboptimal_acquire_and_present_rebuild_only_once() {
    let mut backend = ScriptedBackend::new(2, extent(800, 600));
    backend.acquire_script.push_back(Ok(AcquireOutcome::Acquired {
        image_index: 1,
        suboptimal: true,
    }));
    backend.present_script.push_back(Ok(PresentStatus::Suboptimal));
    let mut orchestrator = FrameOrchestrator::new();

    draw(&mut orchestrator, &mut backend).unwrap();
    assert_eq!(backend.rebuild_count(), 1);
}

#[test]
fn fatal_present_error_propagates() {
    let mut backend = ScriptedBackend::new(2, extent(800, 600));
    backend.present_script.push_back(Err(vk::Result::ERROR_DEVICE_LOST));
    let mut orchestrator = FrameOrchestrator::new();

    let err = draw(&mut orchestrator, &mut backend).unwrap_err();
    assert!(matches!(
        err,
        FrameError::Device {
            step: FrameStep::Present,
            result: vk::Result::ERROR_DEVICE_LOST,
        }
    ));
    assert_eq!(backend.rebuild_count(), 0);
    assert_eq!(orchestrator.frame_number(), 0);
}

#[test]
fn fatal_acquire_error_propagates() {
    let mut backend = ScriptedBackend::new(2, extent(800, 600));
    backend.acquire_script.push_back(Err(vk::Result::ERROR_SURFACE_LOST_KHR));
    let mut orchestrator = FrameOrchestrator::new();

    assert!(matches!(
        draw(&mut orchestrator, &mut backend),
        Err(FrameError::Device { step: FrameStep::Acquire, .. })
    ));
}

#[test]
fn ring_slots_are_never_reused_before_their_fence() {
    for ring_size in [2usize, 3] {
        let mut backend = ScriptedBackend::new(ring_size, extent(320, 240));
        let mut orchestrator = FrameOrchestrator::new();

        for _ in 0..10 {
            draw(&mut orchestrator, &mut backend).unwrap();
        }

        let expected: Vec<usize> = (0..10).map(|n| n % ring_size).collect();
        assert_eq!(backend.submitted_slots(), expected);

        // Every re-record of a slot is preceded by a wait on that slot since its last submit.
        let events = backend.events();
        for (i, event) in events.iter().enumerate() {
            if let Event::BeginRecord { slot, .. } = event {
                let last_submit = events[..i].iter().rposition(|e| *e == Event::Submit(*slot));
                let last_wait = events[..i].iter().rposition(|e| *e == Event::Wait(*slot));
                if let Some(submit) = last_submit {
                    assert!(last_wait.is_some_and(|wait| wait > submit), "slot {slot} reused without a wait");
                }
            }
        }
    }
}

#[test]
fn out_of_date_acquire_skips_and_rearms_the_slot() {
    let mut backend = ScriptedBackend::new(2, extent(800, 600));
    backend.acquire_script.push_back(Ok(AcquireOutcome::OutOfDate));
    let mut orchestrator = FrameOrchestrator::new();

    assert_eq!(
        draw(&mut orchestrator, &mut backend).unwrap(),
        FrameOutcome::Skipped(SkipReason::OutOfDate)
    );
    assert_eq!(
        backend.events(),
        [
            Event::Wait(0),
            Event::Reset(0),
            Event::Acquire(0),
            Event::Rearm(0),
            Event::Rebuild(extent(800, 600)),
        ]
    );
    assert_eq!(orchestrator.frame_number(), 0);

    // The same slot is usable again; a missing re-arm would hang on its fence here.
    assert_eq!(draw(&mut orchestrator, &mut backend).unwrap(), FrameOutcome::Presented);
    assert_eq!(backend.submitted_slots(), [0]);
}

#[test]
fn zero_extent_skips_without_touching_the_gpu() {
    let mut backend = ScriptedBackend::new(2, extent(0, 600));
    let mut orchestrator = FrameOrchestrator::new();

    assert_eq!(
        draw(&mut orchestrator, &mut backend).unwrap(),
        FrameOutcome::Skipped(SkipReason::ZeroExtent)
    );
    assert!(backend.events().is_empty());
    assert_eq!(orchestrator.frame_number(), 0);
}

#[test]
fn rebuild_at_zero_extent_waits_for_a_visible_window() {
    let mut backend = ScriptedBackend::new(2, extent(800, 600));
    backend.present_script.push_back(Ok(PresentStatus::Suboptimal));
    backend.minimise_on_present = true;
    let mut orchestrator = FrameOrchestrator::new();

    assert_eq!(draw(&mut orchestrator, &mut backend).unwrap(), FrameOutcome::Presented);
    assert!(orchestrator.rebuild_pending());
    assert_eq!(backend.rebuild_count(), 0);

    backend.minimise_on_present = false;
    backend.clear_events();
    assert_eq!(
        draw(&mut orchestrator, &mut backend).unwrap(),
        FrameOutcome::Skipped(SkipReason::ZeroExtent)
    );
    assert!(backend.events().is_empty());
    assert!(orchestrator.rebuild_pending());

    backend.window_extent = extent(640, 480);
    assert_eq!(draw(&mut orchestrator, &mut backend).unwrap(), FrameOutcome::PresentedAndRebuilt);
    assert!(!orchestrator.rebuild_pending());
    let events = backend.events();
    assert_eq!(events[0], Event::Rebuild(extent(640, 480)));
    assert!(matches!(events[1], Event::Wait(_)));
    assert_eq!(backend.rebuild_count(), 1);
    assert_eq!(orchestrator.frame_number(), 2);
}

#[test]
fn collapsed_surface_defers_a_requested_rebuild() {
    let mut backend = ScriptedBackend::new(2, extent(800, 600));
    backend.surface_collapsed = true;
    let mut orchestrator = FrameOrchestrator::new();
    orchestrator.request_rebuild();

    assert_eq!(
        draw(&mut orchestrator, &mut backend).unwrap(),
        FrameOutcome::Skipped(SkipReason::ZeroExtent)
    );
    assert!(backend.events().is_empty());
    assert!(orchestrator.rebuild_pending());
    assert_eq!(orchestrator.frame_number(), 0);

    backend.surface_collapsed = false;
    assert_eq!(draw(&mut orchestrator, &mut backend).unwrap(), FrameOutcome::PresentedAndRebuilt);
    assert_eq!(backend.events()[0], Event::Rebuild(extent(800, 600)));
    assert!(!orchestrator.rebuild_pending());
    assert_eq!(orchestrator.frame_number(), 1);
}

#[test]
fn collapsed_surface_after_present_is_not_fatal() {
    let mut backend = ScriptedBackend::new(2, extent(800, 600));
    backend.present_script.push_back(Ok(PresentStatus::OutOfDate));
    backend.surface_collapsed = true;
    let mut orchestrator = FrameOrchestrator::new();

    assert_eq!(draw(&mut orchestrator, &mut backend).unwrap(), FrameOutcome::Presented);
    assert!(orchestrator.rebuild_pending());
    assert_eq!(backend.rebuild_count(), 0);
    assert_eq!(orchestrator.frame_number(), 1);
}

#[test]
fn collapsed_surface_at_acquire_keeps_the_slot_usable() {
    let mut backend = ScriptedBackend::new(2, extent(800, 600));
    backend.acquire_script.push_back(Ok(AcquireOutcome::OutOfDate));
    backend.surface_collapsed = true;
    let mut orchestrator = FrameOrchestrator::new();

    assert_eq!(
        draw(&mut orchestrator, &mut backend).unwrap(),
        FrameOutcome::Skipped(SkipReason::OutOfDate)
    );
    assert!(orchestrator.rebuild_pending());
    assert_eq!(
        draw(&mut orchestrator, &mut backend).unwrap(),
        FrameOutcome::Skipped(SkipReason::ZeroExtent)
    );

    backend.surface_collapsed = false;
    assert_eq!(draw(&mut orchestrator, &mut backend).unwrap(), FrameOutcome::PresentedAndRebuilt);
    assert_eq!(backend.submitted_slots(), [0]);
    assert_eq!(backend.rebuild_count(), 1);
}

#[test]
fn requested_rebuild_runs_before_the_wait() {
    let mut backend = ScriptedBackend::new(2, extent(800, 600));
    let mut orchestrator = FrameOrchestrator::new();
    orchestrator.request_rebuild();
    backend.window_extent = extent(1280, 720);

    assert_eq!(draw(&mut orchestrator, &mut backend).unwrap(), FrameOutcome::PresentedAndRebuilt);
    let events = backend.events();
    assert_eq!(events[0], Event::Rebuild(extent(1280, 720)));
    assert_eq!(events[1], Event::Wait(0));
    assert_eq!(backend.rebuild_count(), 1);
}

#[test]
fn rebuilt_swapchain_images_start_from_undefined() {
    let mut backend = ScriptedBackend::new(2, extent(800, 600));
    backend.present_script.push_back(Ok(PresentStatus::Suboptimal));
    let mut orchestrator = FrameOrchestrator::new();

    draw(&mut orchestrator, &mut backend).unwrap();
    backend.clear_events();
    draw(&mut orchestrator, &mut backend).unwrap();

    let swapchain_transitions: Vec<_> = transitions(&backend.commands())
        .into_iter()
        .filter(|(image, ..)| image.as_raw() != DRAW_TARGET)
        .collect();
    assert_eq!(swapchain_transitions[0].1, TextureLayout::Undefined);
    assert_eq!(swapchain_transitions[0].0, vk::Image::from_raw(FIRST_SWAPCHAIN_IMAGE + 10));
}

#[test]
fn fence_timeout_is_reported_with_its_slot() {
    let mut backend = ScriptedBackend::new(2, extent(800, 600));
    let mut orchestrator = FrameOrchestrator::new();
    draw(&mut orchestrator, &mut backend).unwrap();

    backend.wait_script.push_back(Err(vk::Result::TIMEOUT));
    let err = draw(&mut orchestrator, &mut backend).unwrap_err();
    assert!(matches!(err, FrameError::FenceTimeout { slot: 1 }));
}

#[test]
fn overlay_failure_is_fatal_but_closes_the_pass() {
    let mut backend = ScriptedBackend::new(2, extent(800, 600));
    let mut overlay = backend.overlay();
    overlay.fail = true;
    let mut orchestrator = FrameOrchestrator::new();

    let err = orchestrator.draw(&mut backend, &push(), &mut overlay, "ui").unwrap_err();
    assert!(matches!(err, FrameError::Overlay(_)));
    assert!(err.to_string().contains("overlay exploded"));

    let commands = backend.commands();
    assert_eq!(commands.last(), Some(&Command::EndRendering));
    assert!(backend.submitted_slots().is_empty());
}
