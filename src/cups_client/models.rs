/// One print queue as reported by `CUPS-Get-Printers`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CupsPrinter {
    pub queue_name: String,
    pub state: CupsPrinterState,
    pub state_reasons: Vec<String>,
    pub accepting_jobs: Option<bool>,
}

impl CupsPrinter {
    /// CUPS reports an unreachable device through the state reasons
    /// (`offline-report`), a paused queue through `printer-is-accepting-jobs`.
    pub fn is_offline(&self) -> bool {
        self.state_reasons.iter().any(|r| r.contains("offline")) || self.accepting_jobs == Some(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CupsPrinterState {
    Idle,
    Processing,
    Stopped,
    Unknown,
}

impl CupsPrinterState {
    pub fn from_ipp(value: i32) -> Self {
        match value {
            3 => CupsPrinterState::Idle,
            4 => CupsPrinterState::Processing,
            5 => CupsPrinterState::Stopped,
            _ => CupsPrinterState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CupsPrinterState::Idle => "idle",
            CupsPrinterState::Processing => "processing",
            CupsPrinterState::Stopped => "stopped",
            CupsPrinterState::Unknown => "unknown",
        }
    }
}
