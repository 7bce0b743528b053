pub mod camera;
pub mod encoder;
pub mod frame;
pub mod scheduler;
pub mod source;

pub use encoder::FrameEncoder;
pub use frame::Frame;
pub use scheduler::{CaptureScheduler, SchedulerState, TickOutcome};
pub use source::{CameraDevice, CameraSource, FileSource, ImageSource, SourceKind, VideoStream};
