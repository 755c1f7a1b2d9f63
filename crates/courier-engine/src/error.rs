#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The controller task has exited; no further commands are accepted.
    #[error("session controller stopped")]
    ControllerStopped,
}
