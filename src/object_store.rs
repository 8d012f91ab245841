use crate::config::S3Config;
use anyhow::{Context, Result};
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Object store client for photo images and book PDFs
pub struct ObjectStore {
    client: S3Client,
    image_bucket: String,
    book_bucket: String,
    public_base_url: Option<String>,
}

impl ObjectStore {
    /// Create a new object store client
    pub async fn new(config: &S3Config) -> Result<Self> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        // Force path-style access for MinIO compatibility
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let s3_config = s3_config_builder.build();
        let client = S3Client::from_conf(s3_config);

        info!(
            image_bucket = %config.image_bucket,
            book_bucket = %config.book_bucket,
            region = %config.region,
            "Object store client initialized"
        );

        Ok(Self {
            client,
            image_bucket: config.image_bucket.clone(),
            book_bucket: config.book_bucket.clone(),
            public_base_url: config
                .public_base_url
                .clone()
                .or_else(|| config.endpoint_url.clone()),
        })
    }

    /// Generate the object key for a photo upload
    /// Format: {student_id}/{uuid}{extension}
    pub fn image_key(&self, student_id: i64, extension: &str) -> String {
        format!(
            "{}/{}{}",
            student_id,
            Uuid::new_v4().simple(),
            sanitize_extension(extension)
        )
    }

    /// Generate the object key for a book upload
    /// Format: books/{uuid}.pdf
    pub fn book_key(&self) -> String {
        format!("books/{}.pdf", Uuid::new_v4().simple())
    }

    /// Upload a photo image; returns its public URL
    #[instrument(skip(self, bytes), fields(size_bytes = bytes.len()))]
    pub async fn upload_image(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String> {
        self.put(&self.image_bucket, key, bytes, content_type)
            .await?;
        metrics::counter!("community.objects.images_uploaded").increment(1);
        Ok(self.public_url(&self.image_bucket, key))
    }

    /// Upload a book PDF; returns its public URL
    #[instrument(skip(self, bytes), fields(size_bytes = bytes.len()))]
    pub async fn upload_book(&self, key: &str, bytes: Vec<u8>) -> Result<String> {
        self.put(&self.book_bucket, key, bytes, "application/pdf")
            .await?;
        metrics::counter!("community.objects.books_uploaded").increment(1);
        Ok(self.public_url(&self.book_bucket, key))
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<()> {
        let size = bytes.len();
        let body = ByteStream::from(bytes);

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .context("Failed to upload object")?;

        debug!(bucket = %bucket, key = %key, size_bytes = size, "Object uploaded");

        Ok(())
    }

    /// Public URL for an object in a public-read bucket
    pub fn public_url(&self, bucket: &str, key: &str) -> String {
        match &self.public_base_url {
            Some(base) => format!("{}/{}/{}", base.trim_end_matches('/'), bucket, key),
            None => format!("https://{}.s3.amazonaws.com/{}", bucket, key),
        }
    }
}

/// Sanitize a file extension taken from an uploaded filename
fn sanitize_extension(extension: &str) -> String {
    let ext: String = extension
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '.')
        .collect();

    if ext.is_empty() || !ext.starts_with('.') {
        ".jpg".to_string()
    } else {
        ext
    }
}

/// Extract the extension (with dot) from an uploaded filename
pub fn file_extension(filename: &str) -> &str {
    match filename.rfind('.') {
        Some(idx) if idx > 0 => &filename[idx..],
        _ => ".jpg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_extension() {
        assert_eq!(sanitize_extension(".png"), ".png");
        assert_eq!(sanitize_extension(".jpeg"), ".jpeg");
        assert_eq!(sanitize_extension(""), ".jpg");
        assert_eq!(sanitize_extension("png"), ".jpg");
        assert_eq!(sanitize_extension(".p/n\\g"), ".png");
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("selfie.png"), ".png");
        assert_eq!(file_extension("archive.tar.gz"), ".gz");
        assert_eq!(file_extension("noext"), ".jpg");
        assert_eq!(file_extension(".hidden"), ".jpg");
    }
}
