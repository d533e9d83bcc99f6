use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde_json::Value;

use repomirror_types::{HostingApi, MirrorError, Page, Result};

/// Where the page object sits in a response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Envelope {
    Root,
    /// Nested under a key; directory listings put it under `children`.
    Nested(&'static str),
}

/// Lazily walks a paginated collection, one page per `next()`.
///
/// The sequence ends after a page flagged `isLastPage`, after an empty page,
/// or after a non-last page that gives no `nextPageStart`. A request or decode
/// failure is yielded once and ends the sequence.
pub struct Pager<'a, T> {
    api: &'a dyn HostingApi,
    segments: Vec<String>,
    params: Vec<(String, String)>,
    envelope: Envelope,
    start: Option<u64>,
    done: bool,
    _items: PhantomData<fn() -> T>,
}

impl<'a, T: DeserializeOwned> Pager<'a, T> {
    pub fn new(api: &'a dyn HostingApi, segments: Vec<String>) -> Self {
        Self {
            api,
            segments,
            params: Vec::new(),
            envelope: Envelope::Root,
            start: None,
            done: false,
            _items: PhantomData,
        }
    }

    pub fn param(mut self, key: &str, value: &str) -> Self {
        self.params.push((key.to_string(), value.to_string()));
        self
    }

    pub fn limit(self, limit: Option<u32>) -> Self {
        match limit {
            Some(limit) => self.param("limit", &limit.to_string()),
            None => self,
        }
    }

    pub fn envelope(mut self, envelope: Envelope) -> Self {
        self.envelope = envelope;
        self
    }

    fn endpoint(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }

    fn decode_error(&self, reason: String) -> MirrorError {
        MirrorError::Decode {
            endpoint: self.endpoint(),
            reason,
        }
    }

    fn fetch(&mut self) -> Result<Option<Vec<T>>> {
        let mut params = self.params.clone();
        if let Some(start) = self.start {
            params.push(("start".into(), start.to_string()));
        }
        let body = self.api.get(&self.segments, &params)?;

        let raw = match self.envelope {
            Envelope::Root => body,
            Envelope::Nested(key) => match body {
                Value::Object(mut map) => map
                    .remove(key)
                    .ok_or_else(|| self.decode_error(format!("missing '{key}' envelope")))?,
                _ => return Err(self.decode_error("response is not an object".into())),
            },
        };
        let page: Page<T> =
            serde_json::from_value(raw).map_err(|e| self.decode_error(e.to_string()))?;

        tracing::debug!(
            endpoint = %self.endpoint(),
            start = self.start.unwrap_or(0),
            size = page.size,
            last = page.is_last_page,
            "fetched page"
        );

        if page.size < 1 || page.values.is_empty() {
            self.done = true;
            return Ok(None);
        }

        if page.is_last_page {
            self.done = true;
        } else {
            let current = self.start.unwrap_or(0);
            match page.next_page_start {
                Some(next) if next > current => self.start = Some(next),
                Some(next) => {
                    return Err(self.decode_error(format!(
                        "nextPageStart {next} does not advance past {current}"
                    )))
                }
                None => {
                    tracing::warn!(
                        endpoint = %self.endpoint(),
                        "page is not marked last but has no nextPageStart; stopping"
                    );
                    self.done = true;
                }
            }
        }
        Ok(Some(page.values))
    }
}

impl<T: DeserializeOwned> Iterator for Pager<'_, T> {
    type Item = Result<Vec<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.fetch() {
            Ok(Some(values)) => Some(Ok(values)),
            Ok(None) => None,
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Drain every page into one list.
pub fn read_all<T: DeserializeOwned>(pager: Pager<'_, T>) -> Result<Vec<T>> {
    let mut items = Vec::new();
    for page in pager {
        items.extend(page?);
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{project, MockHosting};
    use repomirror_types::Project;
    use serde_json::json;

    fn projects_path() -> Vec<String> {
        vec!["projects".into()]
    }

    fn starts(mock: &MockHosting) -> Vec<Option<String>> {
        mock.requests()
            .into_iter()
            .map(|(_, params)| {
                params
                    .into_iter()
                    .find(|(k, _)| k == "start")
                    .map(|(_, v)| v)
            })
            .collect()
    }

    #[test]
    fn test_reads_every_page_in_order() {
        let mut mock = MockHosting::new();
        let items: Vec<_> = (0..7).map(|i| project(&format!("P{i}"))).collect();
        mock.collection("/projects", items, 3);

        let projects: Vec<Project> =
            read_all(Pager::new(&mock, projects_path())).expect("read");
        let keys: Vec<_> = projects.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, vec!["P0", "P1", "P2", "P3", "P4", "P5", "P6"]);
        assert_eq!(
            starts(&mock),
            vec![None, Some("3".into()), Some("6".into())]
        );
    }

    #[test]
    fn test_empty_collection_yields_nothing() {
        let mut mock = MockHosting::new();
        mock.collection("/projects", vec![], 25);

        let mut pager: Pager<Project> = Pager::new(&mock, projects_path());
        assert!(pager.next().is_none());
        assert!(pager.next().is_none());
        assert_eq!(mock.request_count("/projects"), 1);
    }

    #[test]
    fn test_single_full_page_stops_on_last_flag() {
        let mut mock = MockHosting::new();
        mock.collection("/projects", vec![project("A"), project("B")], 2);

        let pages: Vec<_> = Pager::<Project>::new(&mock, projects_path()).collect();
        assert_eq!(pages.len(), 1);
        assert_eq!(mock.request_count("/projects"), 1);
    }

    #[test]
    fn test_limit_is_sent_on_every_request() {
        let mut mock = MockHosting::new();
        mock.collection("/projects", vec![project("A"), project("B")], 1);

        let projects: Vec<Project> =
            read_all(Pager::new(&mock, projects_path()).limit(Some(1))).expect("read");
        assert_eq!(projects.len(), 2);
        for (_, params) in mock.requests() {
            assert!(params.contains(&("limit".to_string(), "1".to_string())));
        }
    }

    struct Scripted(Vec<Value>, std::sync::Mutex<usize>);

    impl HostingApi for Scripted {
        fn get(&self, _: &[String], _: &[(String, String)]) -> Result<Value> {
            let mut calls = self.1.lock().unwrap();
            let body = self.0.get(*calls).cloned().unwrap_or(Value::Null);
            *calls += 1;
            Ok(body)
        }
    }

    #[test]
    fn test_missing_next_start_stops_after_page() {
        let api = Scripted(
            vec![json!({ "values": [{ "key": "A" }], "size": 1, "isLastPage": false })],
            Default::default(),
        );
        let projects: Vec<Project> = read_all(Pager::new(&api, projects_path())).expect("read");
        assert_eq!(projects.len(), 1);
        assert_eq!(*api.1.lock().unwrap(), 1);
    }

    #[test]
    fn test_non_advancing_cursor_is_a_decode_error() {
        let api = Scripted(
            vec![
                json!({ "values": [{ "key": "A" }], "size": 1, "isLastPage": false, "nextPageStart": 5 }),
                json!({ "values": [{ "key": "B" }], "size": 1, "isLastPage": false, "nextPageStart": 5 }),
            ],
            Default::default(),
        );
        let mut pager: Pager<Project> = Pager::new(&api, projects_path());
        assert!(pager.next().expect("first").is_ok());
        assert!(matches!(pager.next(), Some(Err(MirrorError::Decode { .. }))));
        assert!(pager.next().is_none());
    }

    #[test]
    fn test_nested_envelope() {
        let api = Scripted(
            vec![json!({
                "path": { "toString": "" },
                "children": { "values": [{ "key": "A" }], "size": 1, "isLastPage": true }
            })],
            Default::default(),
        );
        let projects: Vec<Project> = read_all(
            Pager::new(&api, projects_path()).envelope(Envelope::Nested("children")),
        )
        .expect("read");
        assert_eq!(projects[0].key, "A");
    }

    #[test]
    fn test_missing_envelope_is_a_decode_error() {
        let api = Scripted(vec![json!({ "errors": [] })], Default::default());
        let err = read_all::<Project>(
            Pager::new(&api, projects_path()).envelope(Envelope::Nested("children")),
        )
        .expect_err("no children");
        assert!(matches!(err, MirrorError::Decode { .. }));
    }

    #[test]
    fn test_request_failure_ends_sequence() {
        let mut mock = MockHosting::new();
        mock.fail("/projects", 500);

        let mut pager: Pager<Project> = Pager::new(&mock, projects_path());
        assert!(matches!(
            pager.next(),
            Some(Err(MirrorError::Status { status: 500, .. }))
        ));
        assert!(pager.next().is_none());
        assert_eq!(mock.request_count("/projects"), 1);
    }
}
