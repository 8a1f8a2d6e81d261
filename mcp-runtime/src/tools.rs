//! Tool catalog and dispatcher.
//!
//! Tools are identified by [`ToolId`] and resolved to [`Tool`] trait objects
//! through an immutable [`ToolRegistry`] built once at startup. Each tool
//! declares its parameters with [`ParamSpec`]s; the same descriptors validate
//! input and produce the published `inputSchema`.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use petfinder_core::Credentials;
use petfinder_core::schema::{self, ParamSpec, ValidatedInput, ValidationError};
use serde::Serialize;
use serde_json::{Value, json};

use crate::error::GatewayError;
use crate::upstream::UpstreamClient;

const ANIMAL_SIZES: &[&str] = &["small", "medium", "large", "xlarge"];
const ANIMAL_GENDERS: &[&str] = &["male", "female", "unknown"];
const ANIMAL_AGES: &[&str] = &["baby", "young", "adult", "senior"];
const ANIMAL_COATS: &[&str] = &["short", "medium", "long", "wire", "hairless", "curly"];
const ANIMAL_STATUSES: &[&str] = &["adoptable", "adopted", "found"];
const ANIMAL_SORTS: &[&str] = &["recent", "-recent", "distance", "-distance", "random"];
const ORGANIZATION_SORTS: &[&str] = &[
    "distance", "-distance", "name", "-name", "country", "-country", "state", "-state",
];
const MAX_DISTANCE_MILES: i64 = 500;
const MAX_PAGE_SIZE: i64 = 100;
const DEFAULT_PAGE_SIZE: i64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ToolId {
    PetsSearch,
    PetsGet,
    OrganizationsSearch,
    OrganizationsGet,
    TypesList,
    TypesGet,
    BreedsList,
}

impl ToolId {
    pub const ALL: [ToolId; 7] = [
        ToolId::PetsSearch,
        ToolId::PetsGet,
        ToolId::OrganizationsSearch,
        ToolId::OrganizationsGet,
        ToolId::TypesList,
        ToolId::TypesGet,
        ToolId::BreedsList,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ToolId::PetsSearch => "pets.search",
            ToolId::PetsGet => "pets.get",
            ToolId::OrganizationsSearch => "organizations.search",
            ToolId::OrganizationsGet => "organizations.get",
            ToolId::TypesList => "types.list",
            ToolId::TypesGet => "types.get",
            ToolId::BreedsList => "breeds.list",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, GatewayError> {
        Self::ALL
            .into_iter()
            .find(|id| id.name() == name)
            .ok_or_else(|| GatewayError::ToolNotFound(name.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub id: ToolId,
    pub title: &'static str,
    pub description: &'static str,
    pub params: Vec<ParamSpec>,
}

impl ToolDefinition {
    pub fn name(&self) -> &'static str {
        self.id.name()
    }

    /// Entry for the `tools/list` catalog.
    pub fn to_value(&self) -> Value {
        json!({
            "name": self.name(),
            "title": self.title,
            "description": self.description,
            "inputSchema": schema::json_schema(&self.params),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: String,
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text",
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolResult {
    pub content: Vec<ContentBlock>,
}

impl ToolResult {
    /// A summary line followed by the pretty-printed upstream payload.
    pub fn summary_with_payload(summary: String, payload: &Value) -> Self {
        Self {
            content: vec![
                ContentBlock::text(summary),
                ContentBlock::text(to_pretty_json(payload)),
            ],
        }
    }
}

pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = Result<ToolResult, GatewayError>> + Send + 'a>>;

pub trait Tool: Send + Sync {
    fn definition(&self) -> &ToolDefinition;

    /// Merge declared defaults under the caller's input, then validate.
    fn validate(&self, raw: Value) -> Result<ValidatedInput, ValidationError> {
        let params = &self.definition().params;
        schema::validate(params, &schema::apply_defaults(params, raw))
    }

    fn invoke<'a>(
        &'a self,
        upstream: &'a UpstreamClient,
        credentials: &'a Credentials,
        input: ValidatedInput,
    ) -> ToolFuture<'a>;
}

/// A tool backed by a single Petfinder GET endpoint.
struct PetfinderTool {
    definition: ToolDefinition,
    /// Inputs consumed by the URL path instead of the query string.
    path_params: &'static [&'static str],
    path: fn(&ValidatedInput) -> Vec<String>,
    render: fn(&ValidatedInput, Value) -> ToolResult,
}

impl Tool for PetfinderTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    fn invoke<'a>(
        &'a self,
        upstream: &'a UpstreamClient,
        credentials: &'a Credentials,
        input: ValidatedInput,
    ) -> ToolFuture<'a> {
        Box::pin(async move {
            let path = (self.path)(&input);
            let segments: Vec<&str> = path.iter().map(String::as_str).collect();
            let mut query = input.as_map().clone();
            for name in self.path_params {
                query.remove(*name);
            }
            let payload = upstream.get(credentials, &segments, &query).await?;
            Ok((self.render)(&input, payload))
        })
    }
}

pub struct ToolRegistry {
    tools: BTreeMap<ToolId, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new(tools: Vec<Box<dyn Tool>>) -> Self {
        let tools = tools
            .into_iter()
            .map(|tool| (tool.definition().id, tool))
            .collect();
        Self { tools }
    }

    /// The seven Petfinder tools.
    pub fn petfinder() -> Self {
        Self::new(petfinder_tools())
    }

    pub fn resolve(&self, name: &str) -> Result<&dyn Tool, GatewayError> {
        let id = ToolId::from_name(name)?;
        self.tools
            .get(&id)
            .map(|tool| tool.as_ref())
            .ok_or_else(|| GatewayError::ToolNotFound(name.to_string()))
    }

    pub fn definitions(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.tools.values().map(|tool| tool.definition())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Resolve, validate and invoke a tool on behalf of `credentials`.
    pub async fn dispatch(
        &self,
        upstream: &UpstreamClient,
        name: &str,
        raw_input: Value,
        credentials: &Credentials,
    ) -> Result<ToolResult, GatewayError> {
        let tool = self.resolve(name)?;
        let input = tool.validate(raw_input).inspect_err(|err| {
            tracing::debug!(event = "tool_input_rejected", tool = name, issues = err.issues.len());
        })?;
        tool.invoke(upstream, credentials, input).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::petfinder()
    }
}

fn petfinder_tools() -> Vec<Box<dyn Tool>> {
    let tools = vec![
        PetfinderTool {
            definition: ToolDefinition {
                id: ToolId::PetsSearch,
                title: "Search adoptable pets",
                description: "Search Petfinder animals by type, breed, traits and location. Results are paginated.",
                params: vec![
                    ParamSpec::string("type", "Animal type, e.g. Dog, Cat, Rabbit (see types.list)"),
                    ParamSpec::string_list("breed", "Breed name(s); see breeds.list"),
                    ParamSpec::string_list("size", "Size filter").one_of(ANIMAL_SIZES),
                    ParamSpec::string_list("gender", "Gender filter").one_of(ANIMAL_GENDERS),
                    ParamSpec::string_list("age", "Age filter").one_of(ANIMAL_AGES),
                    ParamSpec::string("color", "Color name valid for the animal type"),
                    ParamSpec::string_list("coat", "Coat filter").one_of(ANIMAL_COATS),
                    ParamSpec::string("status", "Adoption status")
                        .one_of(ANIMAL_STATUSES)
                        .default_value("adoptable"),
                    ParamSpec::string("name", "Animal name (partial matches allowed)"),
                    ParamSpec::string_list("organization", "Organization id(s)"),
                    ParamSpec::boolean("good_with_children", "Only animals good with children"),
                    ParamSpec::boolean("good_with_dogs", "Only animals good with dogs"),
                    ParamSpec::boolean("good_with_cats", "Only animals good with cats"),
                    ParamSpec::boolean("house_trained", "Only house-trained animals"),
                    ParamSpec::boolean("declawed", "Only declawed animals"),
                    ParamSpec::boolean("special_needs", "Only animals with special needs"),
                    ParamSpec::string("location", "City, state; latitude,longitude; or postal code"),
                    ParamSpec::integer("distance", "Distance in miles from location")
                        .min(0)
                        .max(MAX_DISTANCE_MILES),
                    ParamSpec::string("before", "Only animals published before this ISO8601 timestamp"),
                    ParamSpec::string("after", "Only animals published after this ISO8601 timestamp"),
                    ParamSpec::string("sort", "Sort order")
                        .one_of(ANIMAL_SORTS)
                        .default_value("recent"),
                    ParamSpec::integer("page", "Page number").min(1).default_value(1),
                    ParamSpec::integer("limit", "Results per page")
                        .min(1)
                        .max(MAX_PAGE_SIZE)
                        .default_value(DEFAULT_PAGE_SIZE),
                ],
            },
            path_params: &[],
            path: |_| vec!["animals".to_string()],
            render: |input, payload| {
                let summary = page_summary("animals", "pets", input, &payload);
                ToolResult::summary_with_payload(summary, &payload)
            },
        },
        PetfinderTool {
            definition: ToolDefinition {
                id: ToolId::PetsGet,
                title: "Get pet details",
                description: "Fetch a single Petfinder animal by its numeric id.",
                params: vec![ParamSpec::integer("id", "Animal id").required().min(1)],
            },
            path_params: &["id"],
            path: |input| vec!["animals".to_string(), path_value(input, "id")],
            render: |input, payload| {
                let summary = format!("Pet details for ID {}:", path_value(input, "id"));
                ToolResult::summary_with_payload(summary, &unwrap_single(payload, "animal"))
            },
        },
        PetfinderTool {
            definition: ToolDefinition {
                id: ToolId::OrganizationsSearch,
                title: "Search organizations",
                description: "Search animal welfare organizations by name, location or free-text query.",
                params: vec![
                    ParamSpec::string("name", "Organization name (partial matches allowed)"),
                    ParamSpec::string("location", "City, state; latitude,longitude; or postal code"),
                    ParamSpec::integer("distance", "Distance in miles from location")
                        .min(0)
                        .max(MAX_DISTANCE_MILES),
                    ParamSpec::string("state", "Two-letter state or province abbreviation"),
                    ParamSpec::string("country", "Two-letter country abbreviation, e.g. US or CA"),
                    ParamSpec::string("query", "Free-text search over name, city and state"),
                    ParamSpec::string("sort", "Sort order").one_of(ORGANIZATION_SORTS),
                    ParamSpec::integer("page", "Page number").min(1).default_value(1),
                    ParamSpec::integer("limit", "Results per page")
                        .min(1)
                        .max(MAX_PAGE_SIZE)
                        .default_value(DEFAULT_PAGE_SIZE),
                ],
            },
            path_params: &[],
            path: |_| vec!["organizations".to_string()],
            render: |input, payload| {
                let summary = page_summary("organizations", "organizations", input, &payload);
                ToolResult::summary_with_payload(summary, &payload)
            },
        },
        PetfinderTool {
            definition: ToolDefinition {
                id: ToolId::OrganizationsGet,
                title: "Get organization details",
                description: "Fetch a single organization by its id, e.g. NJ333.",
                params: vec![
                    ParamSpec::string("id", "Organization id")
                        .required()
                        .path_segment(),
                ],
            },
            path_params: &["id"],
            path: |input| vec!["organizations".to_string(), path_value(input, "id")],
            render: |input, payload| {
                let summary = format!("Organization details for ID {}:", path_value(input, "id"));
                ToolResult::summary_with_payload(summary, &unwrap_single(payload, "organization"))
            },
        },
        PetfinderTool {
            definition: ToolDefinition {
                id: ToolId::TypesList,
                title: "List animal types",
                description: "List every animal type with its valid coats, colors and genders.",
                params: Vec::new(),
            },
            path_params: &[],
            path: |_| vec!["types".to_string()],
            render: |_, payload| {
                let count = collection_len(&payload, "types");
                ToolResult::summary_with_payload(format!("Found {count} animal types:"), &payload)
            },
        },
        PetfinderTool {
            definition: ToolDefinition {
                id: ToolId::TypesGet,
                title: "Get animal type",
                description: "Fetch one animal type with its valid coats, colors and genders.",
                params: vec![
                    ParamSpec::string("type", "Animal type name, e.g. Dog")
                        .required()
                        .path_segment(),
                ],
            },
            path_params: &["type"],
            path: |input| vec!["types".to_string(), path_value(input, "type")],
            render: |input, payload| {
                let summary = format!("Animal type details for '{}':", path_value(input, "type"));
                ToolResult::summary_with_payload(summary, &unwrap_single(payload, "type"))
            },
        },
        PetfinderTool {
            definition: ToolDefinition {
                id: ToolId::BreedsList,
                title: "List breeds",
                description: "List the breeds available for an animal type.",
                params: vec![
                    ParamSpec::string("type", "Animal type name, e.g. Dog")
                        .required()
                        .path_segment(),
                ],
            },
            path_params: &["type"],
            path: |input| {
                vec![
                    "types".to_string(),
                    path_value(input, "type"),
                    "breeds".to_string(),
                ]
            },
            render: |input, payload| {
                let count = collection_len(&payload, "breeds");
                let summary = format!(
                    "Found {count} breeds for type '{}':",
                    path_value(input, "type")
                );
                ToolResult::summary_with_payload(summary, &payload)
            },
        },
    ];
    tools
        .into_iter()
        .map(|tool| Box::new(tool) as Box<dyn Tool>)
        .collect()
}

fn path_value(input: &ValidatedInput, name: &str) -> String {
    match input.get(name) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn collection_len(payload: &Value, key: &str) -> usize {
    payload
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0)
}

/// `{"animal": {...}}` -> `{...}`; anything else is passed through.
fn unwrap_single(payload: Value, key: &str) -> Value {
    match payload {
        Value::Object(mut map) if map.contains_key(key) => map.remove(key).unwrap_or(Value::Null),
        other => other,
    }
}

fn page_summary(collection: &str, noun: &str, input: &ValidatedInput, payload: &Value) -> String {
    let pagination = payload.get("pagination");
    let read = |key: &str| pagination.and_then(|p| p.get(key)).and_then(Value::as_u64);

    let total = read("total_count").unwrap_or(collection_len(payload, collection) as u64);
    let current = read("current_page")
        .or_else(|| input.i64("page").and_then(|page| u64::try_from(page).ok()))
        .unwrap_or(1);
    let pages = read("total_pages")
        .map(|pages| pages.to_string())
        .unwrap_or_else(|| "?".to_string());

    format!("Found {total} {noun} (page {current} of {pages}):")
}

fn to_pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
