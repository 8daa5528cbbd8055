// Message module - WHAT NODES SAY
// Value types for roles, message metadata, inbound messages and outbound requests

mod model;

pub use model::{Meta, Message, Request, Response, Role};
