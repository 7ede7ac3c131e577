use crate::Core;
use crate::error::ChatError;
use rocket::http::{ContentType, Status};
use rocket::serde::json::Json;
use rocket::{State, get};
use std::path::PathBuf;
use std::sync::Arc;

use super::{AuthedUser, http_error};

fn safe_name(filename: &str) -> bool {
    !filename.is_empty()
        && filename.len() <= 255
        && filename
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
}

fn content_type_for(filename: &str) -> ContentType {
    PathBuf::from(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(ContentType::from_extension)
        .unwrap_or(ContentType::Binary)
}

/// Public attachments: `<data>/uploads/files/normal/<msg>_<uuid><ext>`.
#[get("/api/files/normal/<filename>")]
pub fn get_file_normal(
    core: &State<Arc<Core>>,
    _authed: AuthedUser,
    filename: &str,
) -> Result<(ContentType, Vec<u8>), (Status, Json<serde_json::Value>)> {
    if !safe_name(filename) {
        return Err(http_error(ChatError::Validation("Invalid file name".to_string())));
    }
    let path = PathBuf::from(&core.config.data_dir)
        .join("uploads")
        .join("files")
        .join("normal")
        .join(filename);
    let bytes = std::fs::read(&path)
        .map_err(|_| http_error(ChatError::NotFound("File not found".to_string())))?;
    Ok((content_type_for(filename), bytes))
}

/// Encrypted DM attachments: the server-side name embeds
/// `<sender>_<recipient>_<envelope>_` and only those two users may read it.
#[get("/api/files/encrypted/<filename>")]
pub fn get_file_encrypted(
    core: &State<Arc<Core>>,
    authed: AuthedUser,
    filename: &str,
) -> Result<(ContentType, Vec<u8>), (Status, Json<serde_json::Value>)> {
    if !safe_name(filename) {
        return Err(http_error(ChatError::Validation("Invalid file name".to_string())));
    }
    let mut parts = filename.splitn(4, '_');
    let sender_id = parts.next().and_then(|p| p.parse::<i64>().ok());
    let recipient_id = parts.next().and_then(|p| p.parse::<i64>().ok());
    let envelope_id = parts.next().and_then(|p| p.parse::<i64>().ok());
    let (Some(sender_id), Some(recipient_id), Some(_envelope_id)) =
        (sender_id, recipient_id, envelope_id)
    else {
        return Err(http_error(ChatError::Validation("Invalid file name".to_string())));
    };
    if authed.user.id != sender_id && authed.user.id != recipient_id {
        return Err(http_error(ChatError::Forbidden(
            "You are not part of this conversation".to_string(),
        )));
    }
    let path = PathBuf::from(&core.config.data_dir)
        .join("uploads")
        .join("files")
        .join("encrypted")
        .join(filename);
    let bytes = std::fs::read(&path)
        .map_err(|_| http_error(ChatError::NotFound("File not found".to_string())))?;
    Ok((ContentType::Binary, bytes))
}
