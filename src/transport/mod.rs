mod connector;
mod gate;
mod loopback;
mod message;
mod state;
mod supervisor;

pub use connector::{Connection, Connector, WebSocketConnector, WireSink, WireStream};
pub use gate::InFlightGate;
pub use loopback::{loopback, serve_echo, LoopbackAcceptor, LoopbackConnector, LoopbackPeer};
pub use message::{
    demux, AlertInfo, Detections, Inbound, InboundMetadata, MetadataError, WireMessage,
};
pub use state::ConnectionState;
pub use supervisor::{SendOutcome, Transport};
