//! Route gating: what a view should do given the current session.

use super::SessionSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Restore still running; show a loading state.
    Loading,
    Granted,
    /// Not signed in; go to the sign-in entry point.
    RedirectToSignIn,
    /// Signed in but not allowed here; go home.
    RedirectHome,
}

/// Gate for views that need any signed-in user.
pub fn private_view(session: &SessionSnapshot) -> Access {
    if session.is_bootstrapping {
        Access::Loading
    } else if !session.is_authenticated() {
        Access::RedirectToSignIn
    } else {
        Access::Granted
    }
}

/// Gate for admin-only views. Decided solely by the user's `role`.
pub fn admin_view(session: &SessionSnapshot) -> Access {
    match private_view(session) {
        Access::Granted => match session.current_user {
            Some(ref user) if user.is_admin() => Access::Granted,
            _ => Access::RedirectHome,
        },
        other => other,
    }
}
