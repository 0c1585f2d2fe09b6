pub mod binance;
pub mod decode;
pub mod delta;
pub mod pipeline;
pub mod snapshot;
pub mod table;
pub mod types;
pub mod venue;
