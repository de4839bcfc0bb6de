//! Cadastre service adapter. Implements CadastrePort over HTTP.

pub mod http_client;

pub use http_client::{CatastroHttpClient, DEFAULT_GEO_URL};
