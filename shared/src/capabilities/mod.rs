//! Capabilities the core hands effects to.
//!
//! Rendering, HTTP and key-value storage are Crux capabilities. The modules
//! here add the validation the core applies before anything reaches them:
//! storage slots and value limits in [`kv`], URLs, headers and bodies in
//! [`http`].
pub mod http;
pub mod kv;

pub use crux_core::render::Render;
pub use crux_http::Http;
pub use crux_kv::KeyValue;

pub use self::http::{
    response_parts, HttpError, HttpHeaders, HttpMethod, HttpRequest, HttpResult, ValidatedUrl,
};
pub use self::kv::{KvError, KvKey, KvResult, StorageSlot, TypedSlot};

use crate::event::Event;
use crate::App;

pub type AppHttp = Http<Event>;
pub type AppKv = KeyValue<Event>;

#[derive(crux_core::macros::Effect)]
pub struct Capabilities {
    pub http: Http<Event>,
    pub key_value: KeyValue<Event>,
    pub render: Render<Event>,
}
