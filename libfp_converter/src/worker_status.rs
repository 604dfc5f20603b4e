#[derive(Debug, Clone, Default)]
pub enum BarColor {
    #[default]
    CYAN,
    MAGENTA,
    RED,
    GREEN,
}

/// Progress message sent by a worker for the session it is converting
#[derive(Debug, Clone, Default)]
pub struct WorkerStatus {
    pub progress: f32,
    pub session_id: String,
    pub worker_id: usize,
    pub color: BarColor,
}

impl WorkerStatus {
    pub fn new(progress: f32, session_id: &str, worker_id: usize, color: BarColor) -> Self {
        Self {
            progress,
            session_id: session_id.to_string(),
            worker_id,
            color,
        }
    }
}
