/// Outcome of a signer health check, with human-readable diagnostics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CheckResult {
    pub ok: bool,
    pub messages: Vec<String>,
}

impl CheckResult {
    pub fn ok() -> Self {
        Self { ok: true, messages: Vec::new() }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self { ok: false, messages: vec![message.into()] }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.messages.push(message.into());
        self
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.ok = false;
        self.messages.push(message.into());
    }

    /// Combines two results; the merged result is ok only if both are.
    pub fn merge(mut self, other: CheckResult) -> Self {
        self.ok &= other.ok;
        self.messages.extend(other.messages);
        self
    }
}
