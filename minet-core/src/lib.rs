//! A simulation of a small internet.
//!
//! The pieces of the simulation are routers, each running on its own Tokio
//! task and owning its state outright. Routers exchange text datagrams over
//! an in-process [`Network`] and, depending on the mode a simulation asks
//! for, forward packets by static tables, fragment and reassemble them
//! across links with differing MTUs, or first discover their routes with a
//! path-vector protocol.
//!
//! [`Internet`] is the entry point: configure routers with
//! [`RouterConfig`], spawn them, inject traffic through an endpoint, and
//! observe deliveries through each router's [`RouterHandle`].

pub mod addr;
pub mod fragment;
pub mod internet;
pub mod packet;
pub mod path_vector;
pub mod processor;
pub mod router;
pub mod shutdown;
pub mod table;
pub mod table_io;
pub mod transport;

pub use addr::{Ipv4Address, RouterAddr};
pub use internet::Internet;
pub use packet::{Packet, WireFormat};
pub use router::{Delivery, Mode, Router, RouterConfig, RouterHandle};
pub use shutdown::{ExitStatus, Shutdown};
pub use table::{Destination, ForwardingTable, RouteEntry};
pub use transport::{Network, Transport};
