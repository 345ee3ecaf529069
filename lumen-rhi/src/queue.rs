use ash::vk;

/// A queue handle together with the family it was taken from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Queue {
    handle: vk::Queue,
    family_index: u32,
}

impl Queue {
    pub fn new(handle: vk::Queue, family_index: u32) -> Self {
        Self { handle, family_index }
    }

    pub fn handle(&self) -> vk::Queue { self.handle }

    pub fn family_index(&self) -> u32 { self.family_index }
}
