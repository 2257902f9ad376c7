mod builder;
mod interface;
mod reconnect;
#[cfg(all(feature = "camera", target_os = "linux"))]
mod rtsp;
mod synthetic;

pub use builder::SourceBuilder;
pub use interface::{FrameSource, NextFrame, SourceBackend};
pub use reconnect::{ReconnectPolicy, ReconnectingSource};
#[cfg(all(feature = "camera", target_os = "linux"))]
pub use rtsp::RtspBackend;
pub use synthetic::SyntheticBackend;
