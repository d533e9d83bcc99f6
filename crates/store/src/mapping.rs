use serde_json::{json, Value};

/// Field mapping for the commit index: identifiers and denormalized keys are
/// exact-match keywords so the duplicate check and stale filters hit precisely;
/// hosting timestamps are epoch milliseconds.
pub fn commit_mapping() -> Value {
    json!({
        "properties": {
            "id": { "type": "keyword" },
            "displayId": { "type": "keyword" },
            "repo_name": { "type": "keyword" },
            "project_key": { "type": "keyword" },
            "message": { "type": "text" },
            "authorTimestamp": { "type": "date", "format": "epoch_millis" },
            "committerTimestamp": { "type": "date", "format": "epoch_millis" },
            "branch": {
                "properties": {
                    "id": { "type": "keyword" },
                    "displayId": { "type": "keyword" }
                }
            }
        }
    })
}

/// Field mapping for the file index. The stale-file delete filters on the
/// denormalized keys, which must match whole values only.
pub fn file_mapping() -> Value {
    json!({
        "properties": {
            "repo_name": { "type": "keyword" },
            "project_key": { "type": "keyword" },
            "type": { "type": "keyword" },
            "path": {
                "properties": {
                    "toString": { "type": "keyword" },
                    "parent": { "type": "keyword" }
                }
            },
            "branch": {
                "properties": {
                    "id": { "type": "keyword" },
                    "displayId": { "type": "keyword" }
                }
            }
        }
    })
}

/// Field mapping for the repository index.
pub fn repo_mapping() -> Value {
    json!({
        "properties": {
            "id": { "type": "keyword" },
            "slug": { "type": "keyword" },
            "project": {
                "properties": {
                    "key": { "type": "keyword" }
                }
            }
        }
    })
}
