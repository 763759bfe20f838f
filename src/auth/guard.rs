//! Route table and the guard decision made from the session state.

use super::session::{AuthState, AuthStatus};

pub const LOGIN_ENTRY: &str = "/";
pub const HOME: &str = "/dashboard";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Login,
    Dashboard,
    Receipts,
    Profile,
    ReviewReceipt(String),
    Test,
    NotFound(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAccess {
    /// The login screen; bounces authenticated users to the dashboard.
    LoginEntry,
    Public,
    Protected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// Session not resolved yet; show a neutral loading view.
    Placeholder,
    Render,
    Redirect(String),
    NotFound,
}

impl Route {
    pub fn parse(path: &str) -> Route {
        let path = path.split(['?', '#']).next().unwrap_or("");
        let trimmed = path.trim_end_matches('/');
        match trimmed {
            "" => Route::Login,
            "/dashboard" => Route::Dashboard,
            "/receipt" => Route::Receipts,
            "/profile" => Route::Profile,
            "/test" => Route::Test,
            other => match other.strip_prefix("/review-receipt/") {
                Some(id) if !id.is_empty() && !id.contains('/') => {
                    Route::ReviewReceipt(id.to_string())
                }
                _ => Route::NotFound(path.to_string()),
            },
        }
    }

    pub fn access(&self) -> RouteAccess {
        match self {
            Route::Login => RouteAccess::LoginEntry,
            Route::Test | Route::NotFound(_) => RouteAccess::Public,
            Route::Dashboard | Route::Receipts | Route::Profile | Route::ReviewReceipt(_) => {
                RouteAccess::Protected
            }
        }
    }

    pub fn decide(&self, state: AuthState) -> RouteDecision {
        if state.resolving {
            return RouteDecision::Placeholder;
        }
        let authenticated = state.status == AuthStatus::Authenticated;
        match (self.access(), authenticated) {
            (RouteAccess::LoginEntry, true) => RouteDecision::Redirect(HOME.to_string()),
            (RouteAccess::Protected, false) => RouteDecision::Redirect(LOGIN_ENTRY.to_string()),
            _ if matches!(self, Route::NotFound(_)) => RouteDecision::NotFound,
            _ => RouteDecision::Render,
        }
    }
}
