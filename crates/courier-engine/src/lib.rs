pub mod controller;
pub mod dispatch;
pub mod error;
pub mod hub;
pub mod loopback;
pub mod mock;

pub use controller::{ControllerConfig, SessionController, SessionGate};
pub use dispatch::{DispatchConfig, MessageDispatcher, SendReceipt};
pub use error::EngineError;
pub use hub::{HubSnapshot, Observer, StatusHub, DEFAULT_REPLAY_LIMIT};
pub use loopback::{LoopbackConfig, LoopbackFactory, LoopbackTransport};
