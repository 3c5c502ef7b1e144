use std::collections::HashMap;

/// Variable references handed out to the client, each bound to a label.
///
/// Handles are never reused and never released for the lifetime of a
/// session. Asking twice for the same label gives two different handles.
#[derive(Debug)]
pub struct VariableHandles {
    next: i64,
    labels: HashMap<i64, String>,
}

impl Default for VariableHandles {
    fn default() -> Self {
        Self {
            next: Self::FIRST_HANDLE,
            labels: HashMap::new(),
        }
    }
}

impl VariableHandles {
    pub const FIRST_HANDLE: i64 = 1000;

    pub fn create(&mut self, label: impl Into<String>) -> i64 {
        let handle = self.next;
        self.next += 1;
        self.labels.insert(handle, label.into());
        handle
    }

    pub fn get(&self, handle: i64) -> Option<&str> {
        self.labels.get(&handle).map(String::as_str)
    }
}
