// Route table, navigation and auth guards

use std::fmt;
use tokio::sync::watch;

use crate::auth::AuthSessionState;

/// Client-side routes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Login,
    Register,
    Dashboard,
    Expenses,
    NewExpense,
    EditExpense(i64),
    AskAi,
}

impl Route {
    pub fn path(&self) -> String {
        match self {
            Route::Login => "/login".to_string(),
            Route::Register => "/register".to_string(),
            Route::Dashboard => "/".to_string(),
            Route::Expenses => "/expenses".to_string(),
            Route::NewExpense => "/expenses/new".to_string(),
            Route::EditExpense(id) => format!("/expenses/{}/edit", id),
            Route::AskAi => "/ask".to_string(),
        }
    }

    /// Resolve a path; unknown paths yield `None`
    pub fn parse(path: &str) -> Option<Route> {
        let trimmed = path.trim_end_matches('/');
        let segments: Vec<&str> = trimmed.split('/').filter(|s| !s.is_empty()).collect();

        match segments.as_slice() {
            [] => Some(Route::Dashboard),
            ["login"] => Some(Route::Login),
            ["register"] => Some(Route::Register),
            ["expenses"] => Some(Route::Expenses),
            ["expenses", "new"] => Some(Route::NewExpense),
            ["expenses", id, "edit"] => id.parse().ok().map(Route::EditExpense),
            ["ask"] => Some(Route::AskAi),
            _ => None,
        }
    }

    /// Login and registration are only reachable while logged out
    pub fn is_public(&self) -> bool {
        matches!(self, Route::Login | Route::Register)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Outcome of running a route through the auth guards
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guard {
    /// Session bootstrap still running
    Loading,
    Render(Route),
    Redirect(Route),
}

/// Private routes require a user; public routes bounce authenticated users home
pub fn guard(state: &AuthSessionState, route: Route) -> Guard {
    if state.is_loading {
        return Guard::Loading;
    }

    match (route.is_public(), state.is_authenticated()) {
        (false, false) => Guard::Redirect(Route::Login),
        (true, true) => Guard::Redirect(Route::Dashboard),
        _ => Guard::Render(route),
    }
}

/// Something that can move the UI to another route
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: Route);

    /// Forced navigation to the login entry point after the session is lost
    fn redirect_to_login(&self) {
        self.navigate(Route::Login);
    }
}

/// Navigator that records the current route and lets views observe it
pub struct Router {
    current: watch::Sender<Route>,
}

impl Router {
    pub fn new(initial: Route) -> Self {
        let (current, _) = watch::channel(initial);
        Self { current }
    }

    pub fn current(&self) -> Route {
        self.current.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Route> {
        self.current.subscribe()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new(Route::Dashboard)
    }
}

impl Navigator for Router {
    fn navigate(&self, route: Route) {
        tracing::debug!("Navigating to {}", route);
        self.current.send_replace(route);
    }
}
