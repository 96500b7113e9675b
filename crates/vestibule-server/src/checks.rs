//! Ordered permission checks gating each handler.
//!
//! Checks are declared as data — an ordered list of
//! [`PermissionCheck`] values on the handler — and evaluated with
//! short-circuit-on-first-failure semantics. Each evaluation is a
//! pure read of the request context: the outcome depends only on the
//! bound identity, the auth payload, and the clock.
//!
//! Failure codes are machine-readable and reach the client verbatim:
//! `auth`, `auth.missing`, `auth.invalid`, `auth.expired`,
//! `auth.frozen`.

use serde_json::Value;
use vestibule_types::{Permissions, Timestamp};

use crate::context::RequestContext;

// ---------------------------------------------------------------------------
// CheckFailure
// ---------------------------------------------------------------------------

/// A failed permission check: machine-readable code plus optional
/// detail payload for the client.
#[derive(Clone, Debug)]
pub struct CheckFailure {
    /// Error code the client can react to (`auth`, `auth.missing`, ...).
    pub code: String,
    /// Optional structured detail sent alongside the code.
    pub detail: Option<Value>,
}

impl CheckFailure {
    fn code_only(code: &str) -> Self {
        Self {
            code: code.into(),
            detail: None,
        }
    }
}

/// Outcome of evaluating one check: pass, or fail with a code.
pub type CheckOutcome = Result<(), CheckFailure>;

// ---------------------------------------------------------------------------
// PermissionCheck
// ---------------------------------------------------------------------------

/// One declarative permission check.
///
/// Handlers declare an ordered `Vec<PermissionCheck>`; the connection
/// evaluates them in order and stops at the first failure, never
/// running later checks or the handler itself.
#[derive(Debug)]
pub enum PermissionCheck {
    /// Passes iff the requester's bitmask intersects the required
    /// bits. Anonymous connections hold
    /// [`Permissions::DEFAULT_LOGIN`]. Failure code: `auth`.
    RequireBits(Permissions),

    /// Requires a numeric `code` in the auth payload matching the
    /// identity's stored, unexpired auth code. Failure codes:
    /// `auth.missing`, `auth.invalid`, `auth.expired`.
    AdminAuthCode,

    /// Fails with `auth.frozen` when the bound identity is frozen.
    AdminNotFrozen,

    /// Applies the inner check only when an identity is bound;
    /// anonymous requests pass straight through.
    IfAdmin(Box<PermissionCheck>),
}

impl PermissionCheck {
    /// Evaluates this check against the request context.
    pub fn evaluate(&self, ctx: &RequestContext<'_>) -> CheckOutcome {
        match self {
            PermissionCheck::RequireBits(required) => {
                let granted = ctx
                    .admin()
                    .map(|admin| admin.permissions)
                    .unwrap_or(Permissions::DEFAULT_LOGIN);
                if granted.intersects(*required) {
                    Ok(())
                } else {
                    Err(CheckFailure::code_only("auth"))
                }
            }

            PermissionCheck::AdminAuthCode => {
                let Some(code) = ctx.auth_i64("code") else {
                    return Err(CheckFailure::code_only("auth.missing"));
                };

                // Without a bound identity there is nothing to match
                // the code against.
                let Some(admin) = ctx.admin() else {
                    return Err(CheckFailure::code_only("auth.invalid"));
                };

                let (Some(stored), Some(expiry)) =
                    (admin.auth_code, admin.auth_code_expiry.as_ref())
                else {
                    return Err(CheckFailure::code_only("auth.invalid"));
                };

                if code != stored {
                    return Err(CheckFailure::code_only("auth.invalid"));
                }

                if expiry < &Timestamp::now() {
                    return Err(CheckFailure::code_only("auth.expired"));
                }

                Ok(())
            }

            PermissionCheck::AdminNotFrozen => match ctx.admin() {
                Some(admin) if admin.frozen => Err(CheckFailure::code_only("auth.frozen")),
                _ => Ok(()),
            },

            PermissionCheck::IfAdmin(inner) => {
                if ctx.admin().is_some() {
                    inner.evaluate(ctx)
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// Evaluates an ordered list of checks, short-circuiting on the first
/// failure.
pub fn run_checks(checks: &[PermissionCheck], ctx: &RequestContext<'_>) -> CheckOutcome {
    for check in checks {
        check.evaluate(ctx)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
