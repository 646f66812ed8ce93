//! Legacy SOAP search adapter.
//!
//! The tracker's REST surface has no full-text search, so free-text queries
//! go through the old MantisConnect SOAP script instead. The adapter builds
//! a fixed envelope (optional filter fragments appended only when present),
//! posts it to the endpoint derived from the REST base URL, and maps the
//! XML response back into the common [`Issue`] shape.
//!
//! Wire values are coerced with `Number(x) || 0` semantics and a result
//! node may be a single object or an array; [`coerce_id`] and
//! [`element_items`] apply those two rules uniformly.

use std::borrow::Cow;

use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Deserialize;

use crate::error::{MantisError, Result};
use crate::gateway::{DEFAULT_PAGE, DEFAULT_PAGE_SIZE};
use crate::http::{map_send_error, REQUEST_TIMEOUT};
use crate::models::{AccountRef, CustomFieldValue, Issue, ObjectRef};

const REST_SUFFIX: &str = "/api/rest";
const SOAP_SCRIPT_PATH: &str = "/api/soap/mantisconnect.php";
const MC_NAMESPACE: &str = "http://futureware.biz/mantisconnect";
const SEARCH_OPERATION: &str = "mc_filter_search_issues";

/// Parameters for the full-text search envelope. `page` is 1-based on this
/// side and translated to the wire's 0-based numbering.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SearchFilter {
    pub search: String,
    pub project_id: Option<u32>,
    pub page_size: Option<u32>,
    pub page: Option<u32>,
}

/// Derives the SOAP endpoint from the REST base URL: the first `/api/rest`
/// occurrence is removed and the MantisConnect script path appended.
pub fn soap_endpoint(base_url: &str) -> String {
    let stripped = base_url.trim_end_matches('/').replacen(REST_SUFFIX, "", 1);
    format!("{}{}", stripped.trim_end_matches('/'), SOAP_SCRIPT_PATH)
}

/// Escapes the five XML metacharacters (`& < > " '`) in interpolated text.
fn escape_text(raw: &str) -> Cow<'_, str> {
    quick_xml::escape::escape(raw)
}

/// Client for the tracker's MantisConnect SOAP script.
#[derive(Debug, Clone)]
pub struct SoapClient {
    http: reqwest::Client,
    endpoint: String,
    api_token: Option<String>,
}

impl SoapClient {
    /// Builds the client; shares the REST wrapper's fixed timeout.
    pub fn new(base_url: &str, api_token: Option<&str>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| MantisError::validation(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            endpoint: soap_endpoint(base_url),
            api_token: api_token.map(str::to_string),
        })
    }

    /// Runs the full-text search and maps the wire items into issues.
    ///
    /// A response without a result node is an empty search, not a failure;
    /// a fault node raises [`MantisError::Fault`] with the fault string.
    pub async fn search_issues(&self, filter: &SearchFilter) -> Result<Vec<Issue>> {
        let envelope = self.build_envelope(filter);
        tracing::debug!(
            target: "mantis::soap",
            endpoint = %self.endpoint,
            search = %filter.search,
            "dispatching search envelope"
        );
        let response = self
            .http
            .post(&self.endpoint)
            .header("Content-Type", "text/xml; charset=utf-8")
            .header("SOAPAction", format!("{MC_NAMESPACE}#{SEARCH_OPERATION}"))
            .body(envelope)
            .send()
            .await
            .map_err(map_send_error)?;
        let status = response.status();
        let text = response.text().await.map_err(map_send_error)?;
        if !status.is_success() {
            return Err(MantisError::Api {
                status: status.as_u16(),
                body: text,
            });
        }
        parse_search_response(&text)
    }

    /// One fixed envelope per call. Credentials ride in the password field
    /// with the username left empty; optional filter fragments are appended
    /// only when the corresponding parameter is present.
    fn build_envelope(&self, filter: &SearchFilter) -> String {
        let page_number = filter.page.unwrap_or(DEFAULT_PAGE).max(1) - 1;
        let per_page = filter.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        let mut fragments = String::new();
        if let Some(project_id) = filter.project_id {
            fragments.push_str(&format!(
                "\n        <project_id>{project_id}</project_id>"
            ));
        }
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/" xmlns:mc="{namespace}">
  <SOAP-ENV:Body>
    <mc:{operation}>
      <username></username>
      <password>{password}</password>
      <filter>
        <search>{search}</search>{fragments}
      </filter>
      <page_number>{page_number}</page_number>
      <per_page>{per_page}</per_page>
    </mc:{operation}>
  </SOAP-ENV:Body>
</SOAP-ENV:Envelope>"#,
            namespace = MC_NAMESPACE,
            operation = SEARCH_OPERATION,
            password = escape_text(self.api_token.as_deref().unwrap_or("")),
            search = escape_text(&filter.search),
            fragments = fragments,
            page_number = page_number,
            per_page = per_page,
        )
    }
}

/// One parsed XML element, namespace prefix already stripped.
#[derive(Debug, Default)]
struct XmlElement {
    name: String,
    text: String,
    children: Vec<XmlElement>,
}

/// `foo:bar` and `bar` both read as `bar`.
fn local_name_of(qname: &[u8]) -> String {
    let name = String::from_utf8_lossy(qname);
    match name.rsplit_once(':') {
        Some((_, local)) => local.to_string(),
        None => name.into_owned(),
    }
}

fn malformed(detail: impl std::fmt::Display) -> MantisError {
    MantisError::fault(format!("malformed search response: {detail}"))
}

/// Parses the whole document into an element tree under a virtual root.
fn parse_document(xml: &str) -> Result<XmlElement> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut stack = vec![XmlElement::default()];

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                stack.push(XmlElement {
                    name: local_name_of(e.name().as_ref()),
                    ..Default::default()
                });
            }
            Ok(Event::Empty(ref e)) => {
                let element = XmlElement {
                    name: local_name_of(e.name().as_ref()),
                    ..Default::default()
                };
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(element);
                }
            }
            Ok(Event::Text(ref e)) => {
                let decoded = e.unescape().map_err(malformed)?;
                let trimmed = decoded.trim();
                if !trimmed.is_empty() {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(trimmed);
                    }
                }
            }
            Ok(Event::CData(ref e)) => {
                let raw = String::from_utf8_lossy(e);
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&raw);
                }
            }
            Ok(Event::End(_)) => {
                // The virtual root never pops; unbalanced ends are the
                // parser's problem and surface as an Err event.
                if stack.len() > 1 {
                    if let Some(finished) = stack.pop() {
                        if let Some(parent) = stack.last_mut() {
                            parent.children.push(finished);
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(malformed(e)),
            _ => {}
        }
        buf.clear();
    }

    stack.pop().ok_or_else(|| malformed("empty document"))
}

/// Depth-first search by (prefix-stripped) element name.
fn find_element<'a>(element: &'a XmlElement, name: &str) -> Option<&'a XmlElement> {
    if element.name == name {
        return Some(element);
    }
    element
        .children
        .iter()
        .find_map(|child| find_element(child, name))
}

fn child<'a>(element: &'a XmlElement, name: &str) -> Option<&'a XmlElement> {
    element.children.iter().find(|c| c.name == name)
}

fn child_text<'a>(element: &'a XmlElement, name: &str) -> Option<&'a str> {
    child(element, name)
        .map(|c| c.text.as_str())
        .filter(|t| !t.is_empty())
}

/// `Number(x) || 0` coercion: missing, empty, or non-numeric text becomes 0.
/// A true zero id is indistinguishable from an absent one; that matches the
/// tracker's established clients and is kept deliberately.
fn coerce_id(text: Option<&str>) -> u32 {
    text.and_then(|t| t.trim().parse::<f64>().ok())
        .filter(|f| f.is_finite() && *f >= 0.0)
        .map(|f| f as u32)
        .unwrap_or(0)
}

/// Normalizes a result node into a list: wire arrays yield their `item`
/// children, a bare single object yields itself, an empty node nothing.
fn element_items(result: &XmlElement) -> Vec<&XmlElement> {
    let items: Vec<&XmlElement> = result
        .children
        .iter()
        .filter(|c| c.name == "item")
        .collect();
    if !items.is_empty() {
        return items;
    }
    if result.children.is_empty() {
        Vec::new()
    } else {
        vec![result]
    }
}

fn object_ref_from(element: &XmlElement) -> ObjectRef {
    ObjectRef {
        id: coerce_id(child_text(element, "id")),
        name: child_text(element, "name").unwrap_or_default().to_string(),
    }
}

fn account_ref_from(element: &XmlElement) -> AccountRef {
    AccountRef {
        id: coerce_id(child_text(element, "id")),
        name: child_text(element, "name").unwrap_or_default().to_string(),
        email: child_text(element, "email").map(str::to_string),
        real_name: child_text(element, "real_name").map(str::to_string),
    }
}

/// The wire reports a category either as an `{id, name}` pair or as a bare
/// string, depending on the tracker version.
fn category_from(element: &XmlElement) -> ObjectRef {
    match child(element, "category") {
        Some(c) if !c.children.is_empty() => object_ref_from(c),
        Some(c) => ObjectRef {
            id: 0,
            name: c.text.clone(),
        },
        None => ObjectRef::default(),
    }
}

fn custom_fields_from(element: &XmlElement) -> Option<Vec<CustomFieldValue>> {
    let container = child(element, "custom_fields")?;
    let values: Vec<CustomFieldValue> = element_items(container)
        .into_iter()
        .map(|item| CustomFieldValue {
            field: child(item, "field").map(object_ref_from).unwrap_or_default(),
            value: child_text(item, "value").unwrap_or_default().to_string(),
        })
        .collect();
    if values.is_empty() {
        None
    } else {
        Some(values)
    }
}

/// Maps one wire item into the common issue shape. Optional sub-objects
/// stay absent when the wire omits them.
fn issue_from_element(element: &XmlElement) -> Issue {
    Issue {
        id: coerce_id(child_text(element, "id")),
        summary: child_text(element, "summary").unwrap_or_default().to_string(),
        description: child_text(element, "description")
            .unwrap_or_default()
            .to_string(),
        status: child(element, "status").map(object_ref_from).unwrap_or_default(),
        project: child(element, "project")
            .map(object_ref_from)
            .unwrap_or_default(),
        category: category_from(element),
        reporter: child(element, "reporter")
            .map(account_ref_from)
            .unwrap_or_default(),
        handler: child(element, "handler").map(account_ref_from),
        priority: child(element, "priority").map(object_ref_from),
        severity: child(element, "severity").map(object_ref_from),
        custom_fields: custom_fields_from(element),
        created_at: child_text(element, "date_submitted").map(str::to_string),
        updated_at: child_text(element, "last_updated").map(str::to_string),
    }
}

/// Resolves the three response shapes: a result node (list of issues), a
/// fault node (typed error), or neither (empty search).
fn parse_search_response(xml: &str) -> Result<Vec<Issue>> {
    let document = parse_document(xml)?;
    let Some(result) = find_element(&document, "return") else {
        if let Some(fault) = find_element(&document, "Fault") {
            let detail = find_element(fault, "faultstring")
                .map(|e| e.text.clone())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "unspecified SOAP fault".to_string());
            return Err(MantisError::fault(detail));
        }
        return Ok(Vec::new());
    };
    Ok(element_items(result)
        .into_iter()
        .map(issue_from_element)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_with_items(items: &str) -> String {
        format!(
            r#"<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/" xmlns:ns1="http://futureware.biz/mantisconnect">
  <SOAP-ENV:Body>
    <ns1:mc_filter_search_issuesResponse>
      <return>{items}</return>
    </ns1:mc_filter_search_issuesResponse>
  </SOAP-ENV:Body>
</SOAP-ENV:Envelope>"#
        )
    }

    // ============================================================
    // Endpoint derivation
    // ============================================================

    #[test]
    fn test_soap_endpoint_strips_rest_suffix() {
        assert_eq!(
            soap_endpoint("https://bugs.example.com/api/rest"),
            "https://bugs.example.com/api/soap/mantisconnect.php"
        );
    }

    #[test]
    fn test_soap_endpoint_handles_trailing_slash_and_missing_suffix() {
        assert_eq!(
            soap_endpoint("https://bugs.example.com/api/rest/"),
            "https://bugs.example.com/api/soap/mantisconnect.php"
        );
        assert_eq!(
            soap_endpoint("https://bugs.example.com"),
            "https://bugs.example.com/api/soap/mantisconnect.php"
        );
    }

    // ============================================================
    // Envelope construction
    // ============================================================

    fn test_client(token: Option<&str>) -> SoapClient {
        SoapClient::new("https://bugs.example.com/api/rest", token).unwrap()
    }

    #[test]
    fn test_envelope_escapes_all_five_metacharacters() {
        let client = test_client(Some("key"));
        let filter = SearchFilter {
            search: r#"<b>&'fish"</b>"#.to_string(),
            ..Default::default()
        };

        let envelope = client.build_envelope(&filter);

        assert!(envelope.contains("&lt;b&gt;&amp;&apos;fish&quot;&lt;/b&gt;"));
        assert!(!envelope.contains(r#"<search><b>"#));
    }

    #[test]
    fn test_envelope_translates_page_to_zero_based() {
        let client = test_client(None);

        let first = client.build_envelope(&SearchFilter {
            search: "crash".into(),
            page: Some(1),
            ..Default::default()
        });
        assert!(first.contains("<page_number>0</page_number>"));

        let third = client.build_envelope(&SearchFilter {
            search: "crash".into(),
            page: Some(3),
            ..Default::default()
        });
        assert!(third.contains("<page_number>2</page_number>"));

        // Unset pages default to the first one.
        let unset = client.build_envelope(&SearchFilter {
            search: "crash".into(),
            ..Default::default()
        });
        assert!(unset.contains("<page_number>0</page_number>"));
        assert!(unset.contains("<per_page>50</per_page>"));
    }

    #[test]
    fn test_envelope_appends_project_fragment_only_when_present() {
        let client = test_client(None);

        let without = client.build_envelope(&SearchFilter {
            search: "crash".into(),
            ..Default::default()
        });
        assert!(!without.contains("<project_id>"));

        let with = client.build_envelope(&SearchFilter {
            search: "crash".into(),
            project_id: Some(3),
            ..Default::default()
        });
        assert!(with.contains("<project_id>3</project_id>"));
    }

    #[test]
    fn test_envelope_passes_key_as_password_with_empty_username() {
        let client = test_client(Some("api-key-123"));
        let envelope = client.build_envelope(&SearchFilter {
            search: "crash".into(),
            ..Default::default()
        });

        assert!(envelope.contains("<username></username>"));
        assert!(envelope.contains("<password>api-key-123</password>"));
    }

    // ============================================================
    // Response parsing
    // ============================================================

    #[test]
    fn test_parse_response_with_item_array() {
        let xml = response_with_items(
            r#"
        <item>
          <id>101</id>
          <summary>Crash on save</summary>
          <status><id>50</id><name>assigned</name></status>
          <project><id>3</id><name>widgets</name></project>
          <reporter><id>2</id><name>rose</name><email>rose@example.com</email></reporter>
          <handler><id>7</id><name>jack</name></handler>
          <date_submitted>2024-03-01T09:30:00+00:00</date_submitted>
        </item>
        <item>
          <id>102</id>
          <summary>Wrong totals</summary>
          <status><id>80</id><name>resolved</name></status>
        </item>"#,
        );

        let issues = parse_search_response(&xml).unwrap();

        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].id, 101);
        assert_eq!(issues[0].status.name, "assigned");
        assert_eq!(issues[0].handler.as_ref().map(|h| h.id), Some(7));
        assert_eq!(
            issues[0].created_at.as_deref(),
            Some("2024-03-01T09:30:00+00:00")
        );
        assert_eq!(issues[1].id, 102);
        // Absent optional sub-objects stay absent.
        assert!(issues[1].handler.is_none());
        assert!(issues[1].priority.is_none());
        assert!(issues[1].custom_fields.is_none());
    }

    #[test]
    fn test_parse_response_with_single_object_normalizes_to_list() {
        let xml = response_with_items(
            r#"
          <id>55</id>
          <summary>Lone result</summary>
          <status><id>10</id><name>new</name></status>"#,
        );

        let issues = parse_search_response(&xml).unwrap();

        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].id, 55);
        assert_eq!(issues[0].summary, "Lone result");
    }

    #[test]
    fn test_parse_fault_raises_fault_error_with_fault_string() {
        let xml = r#"<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/">
  <SOAP-ENV:Body>
    <SOAP-ENV:Fault>
      <faultcode>SOAP-ENV:Client</faultcode>
      <faultstring>Access denied</faultstring>
    </SOAP-ENV:Fault>
  </SOAP-ENV:Body>
</SOAP-ENV:Envelope>"#;

        let err = parse_search_response(xml).unwrap_err();

        assert!(matches!(err, MantisError::Fault { ref fault } if fault == "Access denied"));
        assert_eq!(err.status_code(), None);
    }

    #[test]
    fn test_parse_response_with_neither_node_is_empty_list() {
        let xml = r#"<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/">
  <SOAP-ENV:Body>
    <ns1:mc_filter_search_issuesResponse xmlns:ns1="http://futureware.biz/mantisconnect"/>
  </SOAP-ENV:Body>
</SOAP-ENV:Envelope>"#;

        let issues = parse_search_response(xml).unwrap();
        assert!(issues.is_empty());
    }

    #[test]
    fn test_parse_empty_return_node_is_empty_list() {
        let xml = response_with_items("");
        let issues = parse_search_response(&xml).unwrap();
        assert!(issues.is_empty());
    }

    #[test]
    fn test_non_numeric_wire_id_coerces_to_zero() {
        let xml = response_with_items(
            r#"
        <item>
          <id>not-a-number</id>
          <summary>Bad id</summary>
        </item>"#,
        );

        let issues = parse_search_response(&xml).unwrap();

        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].id, 0);
    }

    #[test]
    fn test_namespace_prefixes_are_stripped_everywhere() {
        let xml = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Body>
    <ns1:mc_filter_search_issuesResponse xmlns:ns1="http://futureware.biz/mantisconnect">
      <ns1:return>
        <ns1:item>
          <ns1:id>7</ns1:id>
          <ns1:summary>Prefixed</ns1:summary>
        </ns1:item>
      </ns1:return>
    </ns1:mc_filter_search_issuesResponse>
  </soap:Body>
</soap:Envelope>"#;

        let issues = parse_search_response(xml).unwrap();

        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].id, 7);
        assert_eq!(issues[0].summary, "Prefixed");
    }

    #[test]
    fn test_escaped_entities_unescape_in_parsed_text() {
        let xml = response_with_items(
            r#"
        <item>
          <id>9</id>
          <summary>Fish &amp; chips &lt;menu&gt;</summary>
        </item>"#,
        );

        let issues = parse_search_response(&xml).unwrap();
        assert_eq!(issues[0].summary, "Fish & chips <menu>");
    }

    #[test]
    fn test_custom_fields_and_plain_category_map_through() {
        let xml = response_with_items(
            r#"
        <item>
          <id>31</id>
          <category>General</category>
          <custom_fields>
            <item>
              <field><id>4</id><name>browser</name></field>
              <value>firefox</value>
            </item>
          </custom_fields>
        </item>"#,
        );

        let issues = parse_search_response(&xml).unwrap();
        let issue = &issues[0];

        assert_eq!(issue.category.name, "General");
        assert_eq!(issue.category.id, 0);
        let fields = issue.custom_fields.as_ref().unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].field.name, "browser");
        assert_eq!(fields[0].value, "firefox");
    }

    #[test]
    fn test_coerce_id_variants() {
        assert_eq!(coerce_id(Some("42")), 42);
        assert_eq!(coerce_id(Some(" 42 ")), 42);
        assert_eq!(coerce_id(Some("12.9")), 12);
        assert_eq!(coerce_id(Some("")), 0);
        assert_eq!(coerce_id(Some("NaN")), 0);
        assert_eq!(coerce_id(Some("-3")), 0);
        assert_eq!(coerce_id(None), 0);
    }

    #[test]
    fn test_malformed_xml_is_a_fault() {
        let err = parse_search_response("<unclosed").unwrap_err();
        assert!(matches!(err, MantisError::Fault { .. }));
    }
}
