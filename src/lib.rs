//! catastro-gis: cadastral parcel affection analysis with Hexagonal Architecture.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod shared;
pub mod usecases;
