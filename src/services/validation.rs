//! Input checks shared by the services. Each returns the normalised value or
//! a message safe to show the user.

pub const MAX_USERNAME_LEN: usize = 64;
pub const MAX_PASSWORD_BYTES: usize = 1024;

pub fn validate_username(username: &str) -> Result<&str, String> {
    let trimmed = username.trim();

    if trimmed.is_empty() {
        return Err("Username is required".to_string());
    }

    if trimmed.chars().count() > MAX_USERNAME_LEN {
        return Err(format!(
            "Username must be {MAX_USERNAME_LEN} characters or less"
        ));
    }

    if trimmed.chars().any(char::is_control) {
        return Err("Username cannot contain control characters".to_string());
    }

    Ok(trimmed)
}

pub fn validate_password(password: &str) -> Result<&str, String> {
    if password.is_empty() {
        return Err("Password is required".to_string());
    }

    // Bounds the Argon2 input size.
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(format!(
            "Password must be {MAX_PASSWORD_BYTES} bytes or less"
        ));
    }

    Ok(password)
}

pub fn validate_secret(secret: &str, max_length: usize) -> Result<&str, String> {
    let trimmed = secret.trim();

    if trimmed.is_empty() {
        return Err("Secret cannot be empty".to_string());
    }

    if trimmed.chars().count() > max_length {
        return Err(format!("Secret must be {max_length} characters or less"));
    }

    Ok(trimmed)
}
