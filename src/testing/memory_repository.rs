use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use hashlink::LinkedHashMap;
use serde_json::{Map, Value};
use tracing::debug;

use super::yield_now;
use crate::client::{Credentials, RepositoryClient};
use crate::config::ClientConfig;
use crate::diff::DIFF_FIELD;
use crate::node::{METADATA_PREFIX, PRIMARY_TYPE};
use crate::transport::{
    AUTHORIZATION, CSRF_TOKEN, Method, MultipartForm, Request, RequestBody, Response, Transport,
    TransportFailure,
};

pub const INSTANCE: &str = "http://repository.test";

const TOKEN: &str = "token-1";
const REPLICATION_ACTION: &str = "cq:lastReplicationAction";
const VERSION_LABEL: &str = "cq:lastVersionLabel";

#[derive(Debug, Clone)]
enum StoredValue {
    Json(Value),
    Date(String),
    Binary(Vec<u8>),
}

type StoredNode = LinkedHashMap<String, StoredValue>;

/// A repository kept in memory that answers the client's HTTP requests.
///
/// It understands the node read, diff, token, asset and replication endpoints
/// with the default configuration. Every request is recorded and yields to the
/// runtime once before it is answered.
pub struct MemoryRepository {
    config: ClientConfig,
    nodes: RefCell<BTreeMap<String, StoredNode>>,
    requests: RefCell<Vec<Request>>,
    token: RefCell<Option<String>>,
    offline: Cell<bool>,
}

impl MemoryRepository {
    pub fn new() -> Rc<Self> {
        let repository = Self {
            config: ClientConfig::default(),
            nodes: RefCell::new(BTreeMap::new()),
            requests: RefCell::new(Vec::new()),
            token: RefCell::new(Some(TOKEN.to_string())),
            offline: Cell::new(false),
        };
        repository.insert_node("/", "rep:root");
        repository.insert_node("/content", "sling:Folder");
        repository.insert_node("/content/dam", "sling:Folder");
        Rc::new(repository)
    }

    pub fn client(self: &Rc<Self>) -> RepositoryClient<Rc<Self>> {
        self.client_with(ClientConfig::default())
    }

    pub fn client_with(self: &Rc<Self>, config: ClientConfig) -> RepositoryClient<Rc<Self>> {
        RepositoryClient::new(
            Rc::clone(self),
            format!("{INSTANCE}/"),
            Credentials::new("admin", "admin"),
            config,
        )
    }

    pub fn insert_node(&self, path: &str, primary_type: &str) {
        let mut node = StoredNode::new();
        node.insert(
            PRIMARY_TYPE.to_string(),
            StoredValue::Json(Value::from(primary_type)),
        );
        self.nodes.borrow_mut().insert(path.to_string(), node);
    }

    pub fn insert_property(&self, path: &str, name: &str, value: Value) {
        if let Some(node) = self.nodes.borrow_mut().get_mut(path) {
            node.insert(name.to_string(), StoredValue::Json(value));
        }
    }

    pub fn has_node(&self, path: &str) -> bool {
        self.nodes.borrow().contains_key(path)
    }

    /// A stored property as JSON. Dates come back as their ISO text, binaries
    /// as their length.
    pub fn property(&self, path: &str, name: &str) -> Option<Value> {
        let nodes = self.nodes.borrow();
        let value = nodes.get(path)?.get(name)?;
        Some(match value {
            StoredValue::Json(json) => json.clone(),
            StoredValue::Date(text) => Value::from(text.as_str()),
            StoredValue::Binary(data) => Value::from(data.len()),
        })
    }

    pub fn binary(&self, path: &str, name: &str) -> Option<Vec<u8>> {
        match self.nodes.borrow().get(path)?.get(name)? {
            StoredValue::Binary(data) => Some(data.clone()),
            _ => None,
        }
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.borrow().clone()
    }

    pub fn last_request(&self) -> Option<Request> {
        self.requests.borrow().last().cloned()
    }

    /// Number of recorded requests whose URL ends with `suffix`.
    pub fn count(&self, method: Method, suffix: &str) -> usize {
        self.requests
            .borrow()
            .iter()
            .filter(|request| request.method == method && request.url.ends_with(suffix))
            .count()
    }

    /// Number of one-level reads of the node at `path`.
    pub fn reads_of(&self, path: &str) -> usize {
        self.count(Method::Get, &format!("{}{path}.1.json", self.config.diff_endpoint))
    }

    /// Makes the token endpoint answer without a token.
    pub fn withhold_token(&self) {
        self.token.borrow_mut().take();
    }

    pub fn restore_token(&self) {
        *self.token.borrow_mut() = Some(TOKEN.to_string());
    }

    /// Makes every request fail before reaching the repository.
    pub fn set_offline(&self, offline: bool) {
        self.offline.set(offline);
    }

    fn route(&self, request: &Request) -> Response {
        let Some(location) = request.url.strip_prefix(INSTANCE) else {
            return not_found();
        };
        if request.header(AUTHORIZATION).is_none() {
            return Response::new(401, "Unauthorized", "");
        }
        if location == self.config.token_endpoint {
            return self.token_response();
        }
        if let Some(token) = request.header(CSRF_TOKEN)
            && Some(token) != self.token.borrow().as_deref()
        {
            return Response::new(403, "Forbidden", "invalid CSRF token");
        }

        match (&request.method, &request.body) {
            (Method::Get, _) => location
                .strip_prefix(self.config.diff_endpoint.as_str())
                .and_then(|path| path.strip_suffix(".1.json"))
                .map(|path| self.render(path))
                .unwrap_or_else(not_found),
            (Method::Post, RequestBody::Multipart(form)) if location == self.config.diff_endpoint => {
                self.apply_diff(form)
            }
            (Method::Post, RequestBody::Multipart(form)) => location
                .strip_suffix(".createasset.html")
                .map(|parent| self.create_asset(parent, form))
                .unwrap_or_else(not_found),
            (Method::Post, RequestBody::UrlEncoded(body)) => {
                let form = decode_form(body);
                if location == self.config.replication_endpoint {
                    self.replicate(&form)
                } else if location == self.config.tree_activation_endpoint {
                    self.activate_tree(&form)
                } else if location == self.config.page_version_endpoint {
                    self.create_version(&form)
                } else {
                    not_found()
                }
            }
            _ => not_found(),
        }
    }

    fn token_response(&self) -> Response {
        let body = match self.token.borrow().as_deref() {
            Some(token) => serde_json::json!({ "token": token }),
            None => serde_json::json!({}),
        };
        Response::new(200, "OK", body.to_string())
    }

    /// The node's properties, its children with their properties and the
    /// grandchildren as empty objects.
    fn render(&self, path: &str) -> Response {
        let nodes = self.nodes.borrow();
        let Some(node) = nodes.get(path) else {
            return not_found();
        };

        let mut payload = render_properties(node);
        for (child_path, child) in children_of(&nodes, path) {
            let mut rendered = render_properties(child);
            for (grandchild_path, _) in children_of(&nodes, child_path) {
                rendered.insert(name_of(grandchild_path).to_string(), Value::Object(Map::new()));
            }
            payload.insert(name_of(child_path).to_string(), Value::Object(rendered));
        }
        Response::new(200, "OK", Value::Object(payload).to_string())
    }

    /// Applies every line or none of them.
    fn apply_diff(&self, form: &MultipartForm) -> Response {
        let Some(diff) = form.part(DIFF_FIELD).and_then(|part| part.as_text()) else {
            return Response::new(400, "Bad Request", "missing diff");
        };

        let mut nodes = self.nodes.borrow().clone();
        for line in diff.lines() {
            if let Err(message) = apply_line(&mut nodes, line, form) {
                debug!("Rejected diff line '{}': {}", line, message);
                return Response::new(409, "Conflict", message);
            }
        }
        *self.nodes.borrow_mut() = nodes;
        Response::new(200, "OK", "")
    }

    fn create_asset(&self, parent: &str, form: &MultipartForm) -> Response {
        let Some(file) = form.part("file") else {
            return Response::new(400, "Bad Request", "missing file");
        };
        let Some(name) = file.file_name.as_deref() else {
            return Response::new(400, "Bad Request", "missing file name");
        };
        if !self.has_node(parent) {
            return not_found();
        }

        let path = format!("{parent}/{name}");
        let content = format!("{path}/jcr:content");
        self.insert_node(&path, "dam:Asset");
        self.insert_node(&content, "dam:AssetContent");
        let mut nodes = self.nodes.borrow_mut();
        if let Some(node) = nodes.get_mut(&content) {
            node.insert(
                "jcr:mimeType".to_string(),
                StoredValue::Json(Value::from(file.content_type.clone())),
            );
            node.insert("original".to_string(), StoredValue::Binary(file.data.clone()));
        }
        Response::new(201, "Created", "")
    }

    fn replicate(&self, form: &LinkedHashMap<String, String>) -> Response {
        let action = match form.get("action").map(String::as_str) {
            Some("replicate") => "Activate",
            Some("replicatedelete") => "Deactivate",
            _ => return Response::new(400, "Bad Request", "unknown action"),
        };
        self.mark(form, |path, target| path == target, action)
    }

    fn activate_tree(&self, form: &LinkedHashMap<String, String>) -> Response {
        if form.get("cmd").map(String::as_str) != Some("activate") {
            return Response::new(400, "Bad Request", "unknown command");
        }
        self.mark(form, is_within, "Activate")
    }

    fn create_version(&self, form: &LinkedHashMap<String, String>) -> Response {
        let Some(label) = form.get("label") else {
            return Response::new(400, "Bad Request", "missing label");
        };
        let Some(path) = form.get("path") else {
            return Response::new(400, "Bad Request", "missing path");
        };
        if !self.has_node(path) {
            return not_found();
        }
        self.insert_property(path, VERSION_LABEL, Value::from(label.as_str()));
        Response::new(200, "OK", "")
    }

    fn mark(
        &self,
        form: &LinkedHashMap<String, String>,
        selects: impl Fn(&str, &str) -> bool,
        action: &str,
    ) -> Response {
        let Some(target) = form.get("path") else {
            return Response::new(400, "Bad Request", "missing path");
        };
        if !self.has_node(target) {
            return not_found();
        }

        for (path, node) in self.nodes.borrow_mut().iter_mut() {
            if selects(path, target) {
                node.insert(
                    REPLICATION_ACTION.to_string(),
                    StoredValue::Json(Value::from(action)),
                );
            }
        }
        Response::new(200, "OK", "")
    }
}

impl Transport for Rc<MemoryRepository> {
    async fn send(&self, request: Request) -> Result<Response, TransportFailure> {
        yield_now().await;
        debug!("Memory repository received {} {}", request.method, request.url);
        self.requests.borrow_mut().push(request.clone());

        if self.offline.get() {
            return Err("connection refused".into());
        }
        Ok(self.route(&request))
    }
}

fn not_found() -> Response {
    Response::new(404, "Not Found", "")
}

fn name_of(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, name)| name)
}

fn parent_of(path: &str) -> Option<&str> {
    match path.rsplit_once('/')? {
        ("", "") => None,
        ("", _) => Some("/"),
        (parent, _) => Some(parent),
    }
}

fn is_within(path: &str, ancestor: &str) -> bool {
    path == ancestor
        || ancestor == "/"
        || path
            .strip_prefix(ancestor)
            .is_some_and(|rest| rest.starts_with('/'))
}

fn children_of<'a>(
    nodes: &'a BTreeMap<String, StoredNode>,
    path: &'a str,
) -> impl Iterator<Item = (&'a str, &'a StoredNode)> + 'a {
    nodes
        .iter()
        .filter(move |(candidate, _)| {
            candidate.as_str() != path && parent_of(candidate) == Some(path)
        })
        .map(|(candidate, node)| (candidate.as_str(), node))
}

fn render_properties(node: &StoredNode) -> Map<String, Value> {
    let mut rendered = Map::new();
    for (name, value) in node {
        match value {
            StoredValue::Json(json) => {
                rendered.insert(name.clone(), json.clone());
            }
            StoredValue::Date(text) => {
                rendered.insert(name.clone(), Value::from(text.as_str()));
                rendered.insert(format!("{METADATA_PREFIX}{name}"), Value::from("Date"));
            }
            StoredValue::Binary(data) => {
                rendered.insert(format!("{METADATA_PREFIX}{name}"), Value::from(data.len()));
            }
        }
    }
    rendered
}

fn apply_line(
    nodes: &mut BTreeMap<String, StoredNode>,
    line: &str,
    form: &MultipartForm,
) -> Result<(), String> {
    let mut chars = line.chars();
    let sigil = chars.next().ok_or("empty line")?;
    let (target, payload) = chars
        .as_str()
        .split_once(" : ")
        .ok_or_else(|| format!("malformed line '{line}'"))?;

    match sigil {
        '+' => {
            let description: Value =
                serde_json::from_str(payload).map_err(|error| error.to_string())?;
            let primary_type = description
                .get(PRIMARY_TYPE)
                .and_then(Value::as_str)
                .ok_or("missing primary type")?;
            require_parent(nodes, target)?;
            if nodes.contains_key(target) {
                return Err(format!("'{target}' already exists"));
            }
            let mut node = StoredNode::new();
            node.insert(
                PRIMARY_TYPE.to_string(),
                StoredValue::Json(Value::from(primary_type)),
            );
            nodes.insert(target.to_string(), node);
        }
        '>' => {
            if !nodes.contains_key(target) {
                return Err(format!("'{target}' does not exist"));
            }
            require_parent(nodes, payload)?;
            if nodes.contains_key(payload) {
                return Err(format!("'{payload}' already exists"));
            }
            let moved: Vec<String> = nodes
                .keys()
                .filter(|path| is_within(path, target))
                .cloned()
                .collect();
            for path in moved {
                if let Some(node) = nodes.remove(&path) {
                    nodes.insert(format!("{payload}{}", &path[target.len()..]), node);
                }
            }
        }
        '-' => {
            if nodes.contains_key(target) {
                nodes.retain(|path, _| !is_within(path, target));
            } else {
                let (path, name) = split_property(target)?;
                nodes
                    .get_mut(path)
                    .and_then(|node| node.remove(name))
                    .ok_or_else(|| format!("'{target}' does not exist"))?;
            }
        }
        '^' => {
            let (path, name) = split_property(target)?;
            let value = if payload.is_empty() {
                let part = form
                    .part(target)
                    .ok_or_else(|| format!("no attachment for '{target}'"))?;
                match part.content_type.as_deref() {
                    Some("jcr-value/date") => {
                        StoredValue::Date(part.as_text().unwrap_or_default().to_string())
                    }
                    _ => StoredValue::Binary(part.data.clone()),
                }
            } else {
                StoredValue::Json(serde_json::from_str(payload).map_err(|error| error.to_string())?)
            };
            nodes
                .get_mut(path)
                .ok_or_else(|| format!("'{path}' does not exist"))?
                .insert(name.to_string(), value);
        }
        other => return Err(format!("unknown operation '{other}'")),
    }
    Ok(())
}

fn require_parent(nodes: &BTreeMap<String, StoredNode>, path: &str) -> Result<(), String> {
    match parent_of(path) {
        Some(parent) if nodes.contains_key(parent) => Ok(()),
        _ => Err(format!("parent of '{path}' does not exist")),
    }
}

fn split_property(target: &str) -> Result<(&str, &str), String> {
    match target.rsplit_once('/') {
        Some(("", name)) => Ok(("/", name)),
        Some((path, name)) if !name.is_empty() => Ok((path, name)),
        _ => Err(format!("'{target}' does not name a property")),
    }
}

fn decode_form(body: &str) -> LinkedHashMap<String, String> {
    body.split('&')
        .filter_map(|pair| pair.split_once('='))
        .filter_map(|(key, value)| {
            let key = urlencoding::decode(key).ok()?;
            let value = urlencoding::decode(value).ok()?;
            Some((key.into_owned(), value.into_owned()))
        })
        .collect()
}
