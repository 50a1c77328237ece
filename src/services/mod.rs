pub mod auth_service;
pub use auth_service::{AuthError, AuthService};

pub mod auth_service_impl;
pub use auth_service_impl::SeaOrmAuthService;

pub mod secret_service;
pub use secret_service::{SecretEntry, SecretError, SecretService};

pub mod secret_service_impl;
pub use secret_service_impl::SeaOrmSecretService;

pub mod validation;
