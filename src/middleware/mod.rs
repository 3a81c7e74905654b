mod client_ctx;

pub use client_ctx::{ClientCtx, ClientCtxInner, Identity};
