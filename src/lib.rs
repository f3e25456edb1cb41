#![doc = include_str!("../README.md")]

pub mod barcode;
pub mod coordinator;
pub mod crc;
pub mod decoder;
pub mod energy;
pub mod enumeration;
pub mod error;
pub mod events;
pub mod frame;
pub mod node_table;
pub mod parser;
pub mod slot_clock;
pub mod source;
pub mod state;
pub mod transport;
pub mod types;

pub use coordinator::{CoordinatorBuilder, CoordinatorConfig, HostCoordinator};
pub use error::{BarcodeError, PersistenceError, SourceError};
pub use events::Event;
pub use frame::FrameCounters;
pub use parser::Parser;
pub use source::{ByteSource, SerialSource, TcpSource};
pub use state::{InfrastructureSnapshot, PersistentState};
