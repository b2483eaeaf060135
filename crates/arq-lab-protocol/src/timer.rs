/// Single retransmission timer in logical time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetransmitTimer {
    timeout: u64,
    deadline: Option<u64>,
}

impl RetransmitTimer {
    pub fn new(timeout: u64) -> Self {
        Self {
            timeout,
            deadline: None,
        }
    }

    pub fn timeout(&self) -> u64 {
        self.timeout
    }

    pub fn deadline(&self) -> Option<u64> {
        self.deadline
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Arm unless already running.
    pub fn arm(&mut self, now: u64) {
        if self.deadline.is_none() {
            self.restart(now);
        }
    }

    pub fn restart(&mut self, now: u64) {
        self.deadline = Some(now.saturating_add(self.timeout));
    }

    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    pub fn has_expired(&self, now: u64) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }
}
