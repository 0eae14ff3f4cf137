pub mod device_token_repository;
pub mod notification_repository;
pub mod preference_repository;
pub mod template_repository;

pub use device_token_repository::DeviceTokenRepository;
pub use notification_repository::NotificationRepository;
pub use preference_repository::PreferenceRepository;
pub use template_repository::TemplateRepository;
