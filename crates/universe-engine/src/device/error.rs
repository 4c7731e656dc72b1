/// What the frame loop should do after a surface error.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SurfaceErrorAction {
    /// Surface was reconfigured; drop this frame and carry on.
    Reconfigured,
    /// Transient; drop this frame.
    SkipFrame,
    /// The device cannot continue.
    Fatal,
}
