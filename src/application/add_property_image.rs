use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::dispatch::{Request, RequestHandler};
use crate::domain::PropertyImage;
use crate::outcome::Outcome;
use crate::persistence::{StoreError, UnitOfWorkFactory};
use crate::storage::BlobStorage;

use super::validation::{Violations, FILE_NAME_MAX_LEN};

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
pub const ALLOWED_CONTENT_TYPES: [&str; 5] =
    ["image/jpeg", "image/jpg", "image/png", "image/gif", "image/webp"];
const ALLOWED_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];

#[derive(Clone, PartialEq)]
pub struct AddPropertyImage {
    pub property_id: Uuid,
    pub file_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl std::fmt::Debug for AddPropertyImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddPropertyImage")
            .field("property_id", &self.property_id)
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl Request for AddPropertyImage {
    type Response = AddPropertyImageResponse;

    fn name() -> &'static str {
        "AddPropertyImage"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddPropertyImageResponse {
    pub image_id: Uuid,
    pub property_id: Uuid,
    /// Empty when the stored image has no resolvable URL yet
    pub image_url: String,
    pub file_name: String,
    pub uploaded_at: DateTime<Utc>,
}

fn has_image_extension(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ALLOWED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Upload first, then record the image. A record that cannot be saved
/// removes the uploaded file again.
pub struct AddPropertyImageHandler {
    units: Arc<dyn UnitOfWorkFactory>,
    storage: Arc<dyn BlobStorage>,
}

impl AddPropertyImageHandler {
    pub fn new(units: Arc<dyn UnitOfWorkFactory>, storage: Arc<dyn BlobStorage>) -> Self {
        Self { units, storage }
    }

    async fn discard_upload(&self, stored_name: &str, cancel: &CancellationToken) {
        if let Err(error) = self.storage.remove_image(stored_name, cancel).await {
            tracing::warn!(stored_name, error = %error, "Could not remove orphaned upload");
        }
    }
}

#[async_trait]
impl RequestHandler<AddPropertyImage> for AddPropertyImageHandler {
    async fn validate(&self, request: &AddPropertyImage, cancel: &CancellationToken) -> Vec<String> {
        let uow = self.units.create();
        let mut violations = Violations::new();

        if violations.check(!request.property_id.is_nil(), "Property ID is required") {
            violations.check_lookup(
                uow.properties().exists(request.property_id, cancel).await,
                "Property does not exist",
            );
        }

        if violations.text(&request.file_name, "File name", FILE_NAME_MAX_LEN) {
            violations.check(
                has_image_extension(&request.file_name),
                "File must have a valid extension (.jpg, .jpeg, .png, .gif, .webp)",
            );
        }

        if violations.check(!request.content_type.trim().is_empty(), "Content type is required") {
            violations.check(
                ALLOWED_CONTENT_TYPES.contains(&request.content_type.to_lowercase().as_str()),
                format!("Content type must be one of: {}", ALLOWED_CONTENT_TYPES.join(", ")),
            );
        }

        violations.check(
            request.data.len() <= MAX_IMAGE_BYTES,
            format!("File size cannot exceed {}MB", MAX_IMAGE_BYTES / (1024 * 1024)),
        );
        violations.check(!request.data.is_empty(), "Image file cannot be empty");

        violations.into_vec()
    }

    async fn handle(&self, request: AddPropertyImage, cancel: &CancellationToken) -> Outcome<AddPropertyImageResponse> {
        let unique_name = format!("{}_{}", Uuid::new_v4(), request.file_name);
        let stored_name = match self
            .storage
            .upload_image(request.data, &unique_name, &request.content_type, cancel)
            .await
        {
            Ok(stored_name) => stored_name,
            Err(error) => {
                tracing::warn!(error = %error, property_id = %request.property_id, "Image upload failed");
                return Outcome::failure(error.to_string());
            }
        };

        let uow = self.units.create();
        let image = PropertyImage::new(request.property_id, stored_name.clone());
        let saved = async {
            let created = uow.property_images().create(image, cancel).await?;
            uow.save_changes(cancel).await?;
            Ok::<_, StoreError>(created)
        }
        .await;

        let created = match saved {
            Ok(created) => created,
            Err(error) => {
                self.discard_upload(&stored_name, cancel).await;
                return error.into();
            }
        };

        let image_url = match self.storage.image_url(&stored_name, cancel).await {
            Ok(url) => url,
            Err(error) => {
                tracing::debug!(stored_name = %stored_name, error = %error, "Image URL not resolvable");
                String::new()
            }
        };

        tracing::info!(image_id = %created.id, property_id = %created.property_id, "Image added");

        Outcome::success(AddPropertyImageResponse {
            image_id: created.id,
            property_id: created.property_id,
            image_url,
            file_name: request.file_name,
            uploaded_at: created.created_at,
        })
        .with_message("Image added to property successfully")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::{Call, Script, ScriptedUnitOfWork, Step};
    use crate::storage::InMemoryBlobStorage;

    fn request(property_id: Uuid) -> AddPropertyImage {
        AddPropertyImage {
            property_id,
            file_name: "front.jpg".to_string(),
            content_type: "image/jpeg".to_string(),
            data: vec![0xFF, 0xD8, 0xFF],
        }
    }

    fn handler(uow: &ScriptedUnitOfWork) -> (AddPropertyImageHandler, Arc<InMemoryBlobStorage>) {
        let storage = Arc::new(InMemoryBlobStorage::new("http://localhost/images"));
        (AddPropertyImageHandler::new(uow.factory(), storage.clone()), storage)
    }

    #[tokio::test]
    async fn test_upload_record_and_url() {
        let uow = ScriptedUnitOfWork::new(Script::default());
        let (handler, storage) = handler(&uow);
        let property_id = Uuid::new_v4();

        let outcome = handler.handle(request(property_id), &CancellationToken::new()).await;

        assert_eq!(outcome.message(), "Image added to property successfully");
        let response = outcome.into_value().unwrap();
        assert_eq!(response.property_id, property_id);
        assert_eq!(response.file_name, "front.jpg");
        assert!(response.image_url.starts_with("http://localhost/images/"));
        assert!(response.image_url.ends_with("_front.jpg"));

        let recorded = uow
            .calls()
            .into_iter()
            .find_map(|c| match c {
                Call::CreateImage(image) => Some(image),
                _ => None,
            })
            .unwrap();
        assert!(recorded.enabled);
        assert!(storage.contains(&recorded.file).await);
    }

    #[tokio::test]
    async fn test_upload_failure_writes_nothing() {
        let uow = ScriptedUnitOfWork::new(Script::default());
        let (handler, storage) = handler(&uow);
        storage.reject_uploads(true);

        let outcome = handler.handle(request(Uuid::new_v4()), &CancellationToken::new()).await;

        assert!(outcome.is_failure());
        assert!(uow.calls().is_empty());
    }

    #[tokio::test]
    async fn test_save_failure_removes_upload() {
        let uow = ScriptedUnitOfWork::new(Script::default().failing(Step::Save, "fk violation"));
        let (handler, storage) = handler(&uow);

        let outcome = handler.handle(request(Uuid::new_v4()), &CancellationToken::new()).await;

        assert_eq!(outcome.error(), Some(ScriptedUnitOfWork::error_for("fk violation")));
        assert_eq!(storage.image_count().await, 0);
    }

    #[tokio::test]
    async fn test_record_failure_removes_upload() {
        let uow = ScriptedUnitOfWork::new(Script::default().failing(Step::CreateImage, "no such property"));
        let (handler, storage) = handler(&uow);

        let outcome = handler.handle(request(Uuid::new_v4()), &CancellationToken::new()).await;

        assert_eq!(outcome.error(), Some(ScriptedUnitOfWork::error_for("no such property")));
        assert_eq!(uow.count(|c| matches!(c, Call::Save)), 0);
        assert_eq!(storage.image_count().await, 0);
    }

    #[tokio::test]
    async fn test_validation_rules() {
        let uow = ScriptedUnitOfWork::new(Script {
            property_exists: true,
            ..Default::default()
        });
        let (handler, _) = handler(&uow);
        let cancel = CancellationToken::new();

        assert!(handler.validate(&request(Uuid::new_v4()), &cancel).await.is_empty());

        let mut upper = request(Uuid::new_v4());
        upper.file_name = "FRONT.PNG".to_string();
        upper.content_type = "IMAGE/PNG".to_string();
        assert!(handler.validate(&upper, &cancel).await.is_empty());

        let bad = AddPropertyImage {
            property_id: Uuid::new_v4(),
            file_name: "notes.txt".to_string(),
            content_type: "text/plain".to_string(),
            data: Vec::new(),
        };
        assert_eq!(
            handler.validate(&bad, &cancel).await,
            vec![
                "File must have a valid extension (.jpg, .jpeg, .png, .gif, .webp)",
                "Content type must be one of: image/jpeg, image/jpg, image/png, image/gif, image/webp",
                "Image file cannot be empty",
            ]
        );

        let mut large = request(Uuid::new_v4());
        large.data = vec![0; MAX_IMAGE_BYTES + 1];
        assert_eq!(
            handler.validate(&large, &cancel).await,
            vec!["File size cannot exceed 5MB"]
        );
    }
}
