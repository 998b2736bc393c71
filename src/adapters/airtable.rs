//! Table store backed by the Airtable REST API.

use super::{check_response, http_client};
use crate::config::{FieldMap, TableStoreConfig};
use crate::domain::records::{
    PageCursor, RecordFilter, RecordPage, RecordPatch, SegmentRecord, SourceRecord, SourceRef,
};
use crate::error::StoreError;
use crate::ports::table_store::TableStore;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

/// Most rows Airtable accepts in one create request.
const MAX_BATCH: usize = 10;

pub struct AirtableStore {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    base_id: String,
    fields: FieldMap,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    records: Vec<RawRecord>,
    offset: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    id: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

impl AirtableStore {
    pub fn new(config: &TableStoreConfig) -> Result<Self, StoreError> {
        let http = http_client(config.http)?;
        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            base_id: config.base_id.clone(),
            fields: config.fields.clone(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}/{}", self.api_url, self.base_id, table)
    }

    fn decode_record(&self, raw: RawRecord) -> SourceRecord {
        let text = |name: &str| {
            raw.fields
                .get(name)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(String::from)
        };
        SourceRecord {
            source: text(&self.fields.source_url)
                .as_deref()
                .and_then(SourceRef::parse),
            display_name: text(&self.fields.display_name),
            destination_folder: text(&self.fields.destination_folder),
            processed: raw
                .fields
                .get(&self.fields.processed)
                .and_then(Value::as_bool)
                .unwrap_or(false),
            id: raw.id,
        }
    }

    fn segment_fields(&self, row: &SegmentRecord) -> Value {
        let mut fields = Map::new();
        fields.insert(self.fields.segment_name.clone(), json!(row.name));
        fields.insert(self.fields.segment_url.clone(), json!(row.url));
        fields.insert(
            self.fields.segment_source.clone(),
            json!([row.source_record_id]),
        );
        json!({ "fields": fields })
    }
}

#[async_trait]
impl TableStore for AirtableStore {
    async fn list_records(
        &self,
        table: &str,
        filter: &RecordFilter,
        cursor: Option<PageCursor>,
    ) -> Result<RecordPage, StoreError> {
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(formula) = &filter.formula {
            params.push(("filterByFormula", formula.clone()));
        }
        if let Some(view) = &filter.view {
            params.push(("view", view.clone()));
        }
        if let Some(PageCursor(offset)) = cursor {
            params.push(("offset", offset));
        }

        let response = self
            .http
            .get(self.table_url(table))
            .bearer_auth(&self.api_key)
            .query(&params)
            .send()
            .await?;
        let page: ListResponse = check_response(response)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        Ok(RecordPage {
            records: page
                .records
                .into_iter()
                .map(|raw| self.decode_record(raw))
                .collect(),
            next: page.offset.map(PageCursor),
        })
    }

    async fn create_records(
        &self,
        table: &str,
        rows: Vec<SegmentRecord>,
    ) -> Result<(), StoreError> {
        for chunk in rows.chunks(MAX_BATCH) {
            let records: Vec<Value> = chunk.iter().map(|row| self.segment_fields(row)).collect();
            let response = self
                .http
                .post(self.table_url(table))
                .bearer_auth(&self.api_key)
                .json(&json!({ "records": records }))
                .send()
                .await?;
            check_response(response).await?;
            debug!(table, rows = chunk.len(), "Rows created");
        }
        Ok(())
    }

    async fn update_record(
        &self,
        table: &str,
        record_id: &str,
        patch: RecordPatch,
    ) -> Result<(), StoreError> {
        let mut fields = Map::new();
        if let Some(processed) = patch.processed {
            fields.insert(self.fields.processed.clone(), json!(processed));
        }
        let response = self
            .http
            .patch(format!("{}/{}", self.table_url(table), record_id))
            .bearer_auth(&self.api_key)
            .json(&json!({ "fields": fields }))
            .send()
            .await?;
        check_response(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpTimeouts;

    fn store() -> AirtableStore {
        AirtableStore::new(&TableStoreConfig {
            api_url: "https://api.airtable.com/v0/".into(),
            api_key: "key".into(),
            base_id: "appBase".into(),
            source_table: "tblSource".into(),
            destination_table: "tblSegments".into(),
            view: None,
            fields: FieldMap::default(),
            http: HttpTimeouts::default(),
        })
        .unwrap()
    }

    #[test]
    fn test_table_url() {
        assert_eq!(
            store().table_url("tblSource"),
            "https://api.airtable.com/v0/appBase/tblSource"
        );
    }

    #[test]
    fn test_decode_list_response() {
        let body = r#"{
            "records": [
                {
                    "id": "rec1",
                    "fields": {
                        "Name": "Launch",
                        "Google Drive URL": "https://drive.google.com/file/d/1AbC/view",
                        "Drive Folder ID": "folderA",
                        "Video Processed": false
                    }
                },
                { "id": "rec2", "fields": { "Google Drive URL": "  " } }
            ],
            "offset": "itrNext/rec2"
        }"#;
        let page: ListResponse = serde_json::from_str(body).unwrap();
        assert_eq!(page.offset.as_deref(), Some("itrNext/rec2"));

        let store = store();
        let records: Vec<SourceRecord> = page
            .records
            .into_iter()
            .map(|raw| store.decode_record(raw))
            .collect();

        assert_eq!(records[0].id, "rec1");
        assert_eq!(records[0].source, Some(SourceRef::Object("1AbC".into())));
        assert_eq!(records[0].display_name.as_deref(), Some("Launch"));
        assert_eq!(records[0].destination_folder.as_deref(), Some("folderA"));
        assert!(!records[0].processed);

        assert_eq!(records[1].source, None);
        assert_eq!(records[1].display_name, None);
    }

    #[test]
    fn test_last_page_has_no_offset() {
        let page: ListResponse = serde_json::from_str(r#"{"records": []}"#).unwrap();
        assert!(page.records.is_empty());
        assert!(page.offset.is_none());
    }

    #[test]
    fn test_segment_fields_link_back_to_source() {
        let value = store().segment_fields(&SegmentRecord {
            name: "rec1_000.mp4".into(),
            url: "https://drive.google.com/uc?export=download&id=xyz".into(),
            source_record_id: "rec1".into(),
        });

        assert_eq!(
            value,
            json!({
                "fields": {
                    "Name": "rec1_000.mp4",
                    "File URL": "https://drive.google.com/uc?export=download&id=xyz",
                    "Source Video": ["rec1"]
                }
            })
        );
    }
}
