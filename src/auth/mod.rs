// Authentication module
// Token storage, refresh and the process-wide session context

pub mod refresh;
mod session;
mod store;
mod types;

pub use session::{
    AuthSession, AuthSessionState, SessionHandle, SessionSink, LOGIN_PATH, LOGOUT_PATH,
    PROFILE_PATH, REGISTER_PATH,
};
pub use store::{
    default_store_path, MemoryTokenStore, SqliteTokenStore, TokenStore, ACCESS_TOKEN_KEY,
    REFRESH_TOKEN_KEY,
};
pub use types::{
    LoginRequest, LoginResponse, LogoutRequest, RefreshRequest, RefreshResponse, RegisterRequest,
    RegisterResponse, TokenPair, User,
};
