/// Routing policy for incoming stream events.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub own_username: String,
    pub allow_remote_users: bool,
}
