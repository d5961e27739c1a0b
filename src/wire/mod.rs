// nexus_gateway/src/wire/mod.rs
//
// Wire protocol: re-export the codec from a single module.

pub mod codec;

pub use codec::{
    CodecError, DeleteOrder, Header, ModifyOrderQuantity, NewOrder, OrderResponse, Payload,
    ResponseStatus, Trade, HEADER_SIZE,
};
