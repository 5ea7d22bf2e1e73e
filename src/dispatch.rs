pub mod service_bundle;

pub use service_bundle::ServiceBundle;
