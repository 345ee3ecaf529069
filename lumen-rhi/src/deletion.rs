use lumen_core::log;

type Deleter = Box<dyn FnOnce()>;

/// Resources registered for teardown, released in reverse registration order.
///
/// Flush only once the GPU is idle; nothing here waits on the device.
#[derive(Default)]
pub struct DeletionStack {
    entries: Vec<(String, Deleter)>,
}

impl DeletionStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `deleter` on the next flush, before anything registered earlier.
    pub fn push(&mut self, label: impl Into<String>, deleter: impl FnOnce() + 'static) {
        self.entries.push((label.into(), Box::new(deleter)));
    }

    /// Keep `value` alive until the next flush, then drop it.
    pub fn push_owned<T: 'static>(&mut self, label: impl Into<String>, value: T) {
        self.push(label, move || drop(value));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn flush(&mut self) {
        while let Some((label, deleter)) = self.entries.pop() {
            log::debug!("Releasing {}", label);
            deleter();
        }
    }
}

impl Drop for DeletionStack {
    fn drop(&mut self) {
        self.flush();
    }
}
