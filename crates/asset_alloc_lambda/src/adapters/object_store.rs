use asset_alloc_core::object_store::{ObjectStore, ObjectSummary, StoreError};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use super::block_on;

/// Characters left as-is in a `CopySource` key segment; `/` separates
/// segments and is never encoded.
const COPY_SOURCE_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// `bucket/key` with each key segment URL-encoded, as `CopyObject` expects.
fn copy_source(bucket: &str, key: &str) -> String {
    let encoded = key
        .split('/')
        .map(|segment| utf8_percent_encode(segment, COPY_SOURCE_SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/");
    format!("{bucket}/{encoded}")
}

/// S3 bucket as an [`ObjectStore`].
#[derive(Clone)]
pub struct S3ObjectStore {
    bucket: String,
    client: aws_sdk_s3::Client,
}

impl S3ObjectStore {
    pub fn new(bucket: impl Into<String>, client: aws_sdk_s3::Client) -> Self {
        Self {
            bucket: bucket.into(),
            client,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

fn request_error(action: &str, key: &str, error: impl std::error::Error) -> StoreError {
    StoreError::Request(format!(
        "s3 {action} '{key}' failed: {}",
        DisplayErrorContext(error)
    ))
}

impl ObjectStore for S3ObjectStore {
    fn get_object(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let request = self.client.get_object().bucket(&self.bucket).key(key);
        block_on(async move {
            let output = match request.send().await {
                Ok(output) => output,
                Err(error) => {
                    if error
                        .as_service_error()
                        .is_some_and(|service| service.is_no_such_key())
                    {
                        return Err(StoreError::NotFound(key.to_string()));
                    }
                    return Err(request_error("get", key, error));
                }
            };
            let body = output
                .body
                .collect()
                .await
                .map_err(|error| request_error("read", key, error))?;
            Ok(body.into_bytes().to_vec())
        })
    }

    fn put_object(&self, key: &str, body: Vec<u8>) -> Result<(), StoreError> {
        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body));
        block_on(async move {
            request
                .send()
                .await
                .map(|_| ())
                .map_err(|error| request_error("put", key, error))
        })
    }

    fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectSummary>, StoreError> {
        let client = self.client.clone();
        let bucket = self.bucket.clone();
        block_on(async move {
            let mut summaries = Vec::new();
            let mut continuation_token: Option<String> = None;
            loop {
                let output = client
                    .list_objects_v2()
                    .bucket(&bucket)
                    .prefix(prefix)
                    .set_continuation_token(continuation_token.take())
                    .send()
                    .await
                    .map_err(|error| request_error("list", prefix, error))?;

                summaries.extend(output.contents().iter().filter_map(|object| {
                    Some(ObjectSummary {
                        key: object.key()?.to_string(),
                        size: object.size().unwrap_or_default().max(0) as u64,
                        etag: object.e_tag().map(|etag| etag.trim_matches('"').to_string()),
                    })
                }));

                match output.next_continuation_token() {
                    Some(token) if output.is_truncated().unwrap_or(false) => {
                        continuation_token = Some(token.to_string());
                    }
                    _ => break,
                }
            }
            Ok(summaries)
        })
    }

    fn head_object(&self, key: &str) -> Result<Option<ObjectSummary>, StoreError> {
        let request = self.client.head_object().bucket(&self.bucket).key(key);
        block_on(async move {
            match request.send().await {
                Ok(output) => Ok(Some(ObjectSummary {
                    key: key.to_string(),
                    size: output.content_length().unwrap_or_default().max(0) as u64,
                    etag: output.e_tag().map(|etag| etag.trim_matches('"').to_string()),
                })),
                Err(error)
                    if error
                        .as_service_error()
                        .is_some_and(|service| service.is_not_found()) =>
                {
                    Ok(None)
                }
                Err(error) => Err(request_error("head", key, error)),
            }
        })
    }

    fn copy_object(&self, source_key: &str, destination_key: &str) -> Result<(), StoreError> {
        let request = self
            .client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(copy_source(&self.bucket, source_key))
            .key(destination_key);
        block_on(async move {
            request
                .send()
                .await
                .map(|_| ())
                .map_err(|error| request_error("copy", source_key, error))
        })
    }

    fn delete_object(&self, key: &str) -> Result<(), StoreError> {
        let request = self.client.delete_object().bucket(&self.bucket).key(key);
        block_on(async move {
            request
                .send()
                .await
                .map(|_| ())
                .map_err(|error| request_error("delete", key, error))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_source_encodes_each_key_segment() {
        assert_eq!(
            copy_source(
                "alloc-bucket",
                "asset_allocation_data/inbound/TAA final(v2)+\u{fc}_010124.csv"
            ),
            "alloc-bucket/asset_allocation_data/inbound/TAA%20final%28v2%29%2B%C3%BC_010124.csv"
        );
        assert_eq!(
            copy_source("alloc-bucket", "asset_allocation_data/inbound/TAA_010124.csv"),
            "alloc-bucket/asset_allocation_data/inbound/TAA_010124.csv"
        );
    }
}
