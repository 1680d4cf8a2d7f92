use std::sync::Arc;

use crate::config::Config;
use crate::services::{PasswordResetService, TokenService};
use crate::store::UserRepository;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub config: Config,
    pub users: Arc<dyn UserRepository>,
    pub tokens: TokenService,
    pub resets: PasswordResetService,
}
