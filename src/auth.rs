use crate::context::AppContext;
use crate::error::{Error, Result};
use crate::models::{
    ChangePasswordRequest, LoginRequest, RegisterRequest, ResendOtpRequest, VerifyRequest,
};
use crate::session::{TokenPair, User};

const MIN_PASSWORD_LEN: usize = 8;

fn validate_email(email: &str) -> Result<()> {
    let email = email.trim();
    if email.is_empty() {
        return Err(Error::validation("Email is required"));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(Error::validation(format!("Invalid email address: {}", email))),
    }
}

fn validate_new_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(Error::validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// Signs in and starts a fresh session. Any workspace pointer left by a
/// previous session is dropped along with its permissions.
pub async fn login(
    ctx: &mut AppContext,
    email: &str,
    password: &str,
    remember: bool,
) -> Result<User> {
    validate_email(email)?;
    if password.is_empty() {
        return Err(Error::validation("Password is required"));
    }

    let request = LoginRequest {
        email: email.trim().to_string(),
        password: password.to_string(),
        device_id: ctx.store.device_id()?,
    };

    let response = match ctx.backend.login(&request).await {
        Ok(response) => response,
        Err(Error::Unauthorized) => {
            ctx.notifier.error("Invalid email or password");
            return Err(Error::validation("Invalid email or password"));
        }
        Err(e) => {
            ctx.notifier.error(&format!("Login failed: {}", e));
            return Err(e);
        }
    };

    ctx.permissions.invalidate();
    ctx.store.clear_workspace()?;
    let tokens = TokenPair {
        access_token: response.access_token,
        refresh_token: response.refresh_token,
    };
    ctx.store.save_login(&tokens, &response.user)?;
    ctx.store
        .set_remembered_email(remember.then_some(request.email.as_str()))?;

    ctx.controller_mut().mark_authenticated();
    tracing::info!("Signed in as {}", response.user.email);

    Ok(response.user)
}

pub async fn register(ctx: &AppContext, name: &str, email: &str, password: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::validation("Name is required"));
    }
    validate_email(email)?;
    validate_new_password(password)?;

    let request = RegisterRequest {
        name: name.trim().to_string(),
        email: email.trim().to_string(),
        password: password.to_string(),
    };

    if let Err(e) = ctx.backend.register(&request).await {
        ctx.notifier.error(&format!("Registration failed: {}", e));
        return Err(e);
    }

    ctx.notifier
        .success("Account created. Check your email for the verification code.");
    Ok(())
}

pub async fn verify(ctx: &AppContext, email: &str, otp: &str) -> Result<()> {
    validate_email(email)?;
    let otp = otp.trim();
    if otp.is_empty() || !otp.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::validation("Verification code must be numeric"));
    }

    let request = VerifyRequest {
        email: email.trim().to_string(),
        otp: otp.to_string(),
    };

    if let Err(e) = ctx.backend.verify(&request).await {
        ctx.notifier.error(&format!("Verification failed: {}", e));
        return Err(e);
    }

    ctx.notifier.success("Account verified");
    Ok(())
}

pub async fn resend_otp(ctx: &AppContext, email: &str) -> Result<()> {
    validate_email(email)?;

    let request = ResendOtpRequest {
        email: email.trim().to_string(),
    };

    if let Err(e) = ctx.backend.resend_otp(&request).await {
        ctx.notifier.error(&format!("Could not resend code: {}", e));
        return Err(e);
    }

    ctx.notifier.success("A new verification code was sent");
    Ok(())
}

pub async fn change_password(ctx: &mut AppContext, current: &str, new: &str) -> Result<()> {
    if current.is_empty() {
        return Err(Error::validation("Current password is required"));
    }
    validate_new_password(new)?;
    if current == new {
        return Err(Error::validation(
            "New password must differ from the current password",
        ));
    }

    let request = ChangePasswordRequest {
        current_password: current.to_string(),
        new_password: new.to_string(),
    };

    let result = ctx.backend.change_password(&request).await;
    if let Err(e) = &result {
        ctx.notifier.error(&format!("Password change failed: {}", e));
    }
    ctx.intercept(result)?;

    ctx.notifier.success("Password changed");
    Ok(())
}

/// Trades the stored refresh token for a new pair. Storage is only written
/// on success.
pub async fn refresh(ctx: &mut AppContext) -> Result<()> {
    let refresh_token = ctx.store.refresh_token().ok_or(Error::NotAuthenticated)?;

    let result = ctx.backend.refresh_token(&refresh_token).await;
    let tokens = ctx.intercept(result)?;
    ctx.store.save_tokens(&tokens)?;

    tracing::info!("Session tokens refreshed");
    Ok(())
}

/// Ends the session locally whatever the server says. The remote call is
/// best effort. Permissions and auth state are reset before storage is
/// touched, so a storage error is reported only after the session is
/// already over in memory.
pub async fn logout(ctx: &mut AppContext) -> Result<()> {
    if ctx.store.access_token().is_some() {
        if let Err(e) = ctx.backend.logout().await {
            tracing::warn!("Logout request failed: {}", e);
        }
    }

    ctx.permissions.invalidate();
    ctx.controller_mut().mark_unauthenticated();

    ctx.store.clear()
}
