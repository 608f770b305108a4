//! Object catalog and query construction for the records API.
//!
//! Object and field names are validated identifiers, so they can be interpolated directly;
//! every user-supplied value goes through [`escape_literal`] or [`escape_like`].

// std
use std::{borrow::Borrow, ops::Deref};
// self
use crate::_prelude::*;

macro_rules! def_ident {
	($name:ident, $doc:literal, $kind:literal) => {
		#[doc = $doc]
		#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(String);
		impl $name {
			/// Creates a new identifier after validation.
			pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
				let view = value.as_ref();

				validate_view($kind, view)?;

				Ok(Self(view.to_owned()))
			}
		}
		impl Deref for $name {
			type Target = str;

			fn deref(&self) -> &Self::Target {
				&self.0
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.0
			}
		}
		impl TryFrom<String> for $name {
			type Error = IdentifierError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				validate_view($kind, &value)?;

				Ok(Self(value))
			}
		}
		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				write!(f, concat!($kind, "({})"), self.0)
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
		impl FromStr for $name {
			type Err = IdentifierError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::new(s)
			}
		}
	};
}

const IDENTIFIER_MAX_LEN: usize = 128;

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty.
	#[error("{kind} name cannot be empty.")]
	Empty {
		/// Kind of identifier (object, field).
		kind: &'static str,
	},
	/// The identifier contains a character outside `[A-Za-z0-9_.]`.
	#[error("{kind} name `{value}` contains the invalid character {character:?}.")]
	InvalidCharacter {
		/// Kind of identifier (object, field).
		kind: &'static str,
		/// Rejected identifier.
		value: String,
		/// First offending character.
		character: char,
	},
	/// The identifier exceeded the allowed character count.
	#[error("{kind} name exceeds {max} characters.")]
	TooLong {
		/// Kind of identifier (object, field).
		kind: &'static str,
		/// Maximum permitted character count.
		max: usize,
	},
}

def_ident! { ObjectName, "API name of a remote object type, e.g. `Account`.", "Object" }
def_ident! { FieldName, "API name of a field, e.g. `Owner.Name`.", "Field" }

fn validate_view(kind: &'static str, view: &str) -> Result<(), IdentifierError> {
	if view.is_empty() {
		return Err(IdentifierError::Empty { kind });
	}
	if let Some(character) =
		view.chars().find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '.'))
	{
		return Err(IdentifierError::InvalidCharacter { kind, value: view.to_owned(), character });
	}
	if view.len() > IDENTIFIER_MAX_LEN {
		return Err(IdentifierError::TooLong { kind, max: IDENTIFIER_MAX_LEN });
	}

	Ok(())
}

/// Errors raised while assembling an [`ObjectConfig`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum CatalogError {
	/// An object or field name failed validation.
	#[error(transparent)]
	Identifier(#[from] IdentifierError),
	/// The object selects no fields.
	#[error("Object `{object}` must select at least one field.")]
	NoFields {
		/// Object API name.
		object: String,
	},
}

#[derive(Deserialize)]
struct RawObjectConfig {
	api_name: ObjectName,
	fields: Vec<FieldName>,
	search_field: FieldName,
	#[serde(default)]
	filterable: Vec<FieldName>,
}

/// How one object type is queried.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawObjectConfig")]
pub struct ObjectConfig {
	/// Remote object API name.
	pub api_name: ObjectName,
	/// Selected fields, in output order.
	pub fields: Vec<FieldName>,
	/// Field searched with `LIKE` and used for ordering.
	pub search_field: FieldName,
	/// Fields that accept equality filters.
	pub filterable: Vec<FieldName>,
}
impl ObjectConfig {
	/// Creates a config selecting `fields` and searching/ordering on `search_field`.
	pub fn new<I, S>(
		api_name: impl AsRef<str>,
		fields: I,
		search_field: impl AsRef<str>,
	) -> Result<Self, CatalogError>
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		let api_name = ObjectName::new(api_name)?;
		let fields = fields.into_iter().map(FieldName::new).collect::<Result<Vec<_>, _>>()?;

		if fields.is_empty() {
			return Err(CatalogError::NoFields { object: api_name.into() });
		}

		let search_field = FieldName::new(search_field)?;

		Ok(Self { api_name, fields, search_field, filterable: Vec::new() })
	}

	/// Declares the fields that accept equality filters.
	pub fn with_filterable<I, S>(mut self, fields: I) -> Result<Self, CatalogError>
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		self.filterable = fields.into_iter().map(FieldName::new).collect::<Result<_, _>>()?;

		Ok(self)
	}

	/// Returns `true` when `field` accepts equality filters.
	pub fn is_filterable(&self, field: &str) -> bool {
		self.filterable.iter().any(|candidate| candidate.as_ref() == field)
	}
}
impl TryFrom<RawObjectConfig> for ObjectConfig {
	type Error = CatalogError;

	fn try_from(raw: RawObjectConfig) -> Result<Self, Self::Error> {
		if raw.fields.is_empty() {
			return Err(CatalogError::NoFields { object: raw.api_name.into() });
		}

		Ok(Self {
			api_name: raw.api_name,
			fields: raw.fields,
			search_field: raw.search_field,
			filterable: raw.filterable,
		})
	}
}

/// Object types the gateway may query, keyed by the caller-facing type name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectCatalog(BTreeMap<String, ObjectConfig>);
impl ObjectCatalog {
	/// Creates an empty catalog.
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `config` under `object_type`, returning the updated catalog.
	pub fn with(mut self, object_type: impl Into<String>, config: ObjectConfig) -> Self {
		self.0.insert(object_type.into(), config);

		self
	}

	/// Registers `config` under `object_type`.
	pub fn insert(&mut self, object_type: impl Into<String>, config: ObjectConfig) {
		self.0.insert(object_type.into(), config);
	}

	/// Looks up an object type, failing with [`Error::UnsupportedObject`] when unknown.
	pub fn resolve(&self, object_type: &str) -> Result<&ObjectConfig> {
		self.0
			.get(object_type)
			.ok_or_else(|| Error::UnsupportedObject { name: object_type.to_owned() })
	}

	/// Iterates over registered object type names.
	pub fn object_types(&self) -> impl Iterator<Item = &str> {
		self.0.keys().map(String::as_str)
	}
}
impl<K> FromIterator<(K, ObjectConfig)> for ObjectCatalog
where
	K: Into<String>,
{
	fn from_iter<I: IntoIterator<Item = (K, ObjectConfig)>>(iter: I) -> Self {
		Self(iter.into_iter().map(|(key, config)| (key.into(), config)).collect())
	}
}

/// Page request against one object type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
	/// Caller-facing object type, resolved through the [`ObjectCatalog`].
	pub object_type: String,
	/// Substring matched against the search field; ignored when empty.
	#[serde(default)]
	pub search: String,
	/// Equality filters keyed by field name; empty values are ignored.
	#[serde(default)]
	pub filters: BTreeMap<String, String>,
	/// Maximum number of records returned.
	#[serde(default = "default_limit")]
	pub limit: u32,
	/// Number of records skipped.
	#[serde(default)]
	pub offset: u32,
}
impl QueryRequest {
	/// Default page size.
	pub const DEFAULT_LIMIT: u32 = 50;

	/// Creates a request for the first page of `object_type`.
	pub fn new(object_type: impl Into<String>) -> Self {
		Self {
			object_type: object_type.into(),
			search: String::new(),
			filters: BTreeMap::new(),
			limit: Self::DEFAULT_LIMIT,
			offset: 0,
		}
	}

	/// Sets the search term.
	pub fn search(mut self, term: impl Into<String>) -> Self {
		self.search = term.into();

		self
	}

	/// Adds an equality filter.
	pub fn filter(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
		self.filters.insert(field.into(), value.into());

		self
	}

	/// Sets the page size.
	pub fn limit(mut self, limit: u32) -> Self {
		self.limit = limit;

		self
	}

	/// Sets the number of skipped records.
	pub fn offset(mut self, offset: u32) -> Self {
		self.offset = offset;

		self
	}
}

fn default_limit() -> u32 {
	QueryRequest::DEFAULT_LIMIT
}

/// Query strings produced for one page request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuiltQuery {
	/// Page query with ordering and pagination.
	pub records: String,
	/// `COUNT()` query over the same conditions.
	pub count: String,
}

/// Builds the page and count queries for `request`.
///
/// Filters on fields not declared filterable fail with [`Error::UnsupportedFilter`].
pub fn build_query(config: &ObjectConfig, request: &QueryRequest) -> Result<BuiltQuery> {
	let mut conditions = Vec::new();

	if !request.search.is_empty() {
		conditions.push(format!(
			"{} LIKE '%{}%'",
			config.search_field,
			escape_like(&request.search)
		));
	}

	for (field, value) in &request.filters {
		if value.is_empty() {
			continue;
		}
		if !config.is_filterable(field) {
			return Err(Error::UnsupportedFilter {
				object: config.api_name.to_string(),
				field: field.clone(),
			});
		}

		conditions.push(format!("{field} = '{}'", escape_literal(value)));
	}

	let filter = if conditions.is_empty() {
		String::new()
	} else {
		format!(" WHERE {}", conditions.join(" AND "))
	};
	let fields = config.fields.iter().map(FieldName::as_ref).collect::<Vec<_>>().join(", ");

	Ok(BuiltQuery {
		records: format!(
			"SELECT {fields} FROM {}{filter} ORDER BY {} LIMIT {} OFFSET {}",
			config.api_name, config.search_field, request.limit, request.offset
		),
		count: format!("SELECT COUNT() FROM {}{filter}", config.api_name),
	})
}

/// Escapes a value for use inside a single-quoted literal.
pub fn escape_literal(value: &str) -> String {
	let mut escaped = String::with_capacity(value.len());

	for c in value.chars() {
		match c {
			'\\' => escaped.push_str("\\\\"),
			'\'' => escaped.push_str("\\'"),
			'"' => escaped.push_str("\\\""),
			'\n' => escaped.push_str("\\n"),
			'\r' => escaped.push_str("\\r"),
			'\t' => escaped.push_str("\\t"),
			_ => escaped.push(c),
		}
	}

	escaped
}

/// Escapes a value for use inside a `LIKE` pattern, where `%` and `_` are wildcards.
pub fn escape_like(value: &str) -> String {
	escape_literal(value).replace('%', "\\%").replace('_', "\\_")
}
