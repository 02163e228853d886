pub mod appointments;
pub mod change_role;
pub mod create_tenant;
pub mod feed;
pub mod notifications;
pub mod professionals;
pub mod records;
pub mod set_status;
pub mod sync_user;
pub mod update_profile;

pub use appointments::AppointmentsHandler;
pub use change_role::ChangeRoleHandler;
pub use create_tenant::CreateTenantHandler;
pub use feed::FeedHandler;
pub use notifications::NotificationsHandler;
pub use professionals::ProfessionalsHandler;
pub use records::RecordsHandler;
pub use set_status::SetStatusHandler;
pub use sync_user::SyncUserHandler;
pub use update_profile::ProfileHandler;
