// Core modules: manifest compilation, wire values, and error modeling.
pub mod construct;
pub mod descriptor;
pub mod error;
pub mod http;
pub mod length;
pub mod manifest;
pub mod options;
pub mod params;
pub mod payload;
pub mod registry;
pub mod serializer;
pub mod template;
pub mod types;
pub mod value;
pub mod wire;
