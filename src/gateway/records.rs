//! Record queries and picklist lookups built on [`Gateway::execute`].

// self
use crate::{
	_prelude::*,
	gateway::{DataRequest, Gateway},
	http::GatewayHttpClient,
	obs::{self, Operation, OperationOutcome, OperationSpan},
	query::{self, QueryRequest},
	transport::TransportErrorMapper,
};

/// A record as returned by the query endpoint, without its `attributes` envelope.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// One page of records plus the total number of matches.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct QueryPage {
	/// Records on this page.
	pub records: Vec<Record>,
	/// Matches across all pages.
	pub total_size: u64,
}

/// Active picklist entry for a field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PicklistOption {
	/// Display label.
	pub label: String,
	/// Stored value.
	pub value: String,
}

#[derive(Deserialize)]
struct QueryResponse {
	#[serde(rename = "totalSize")]
	total_size: u64,
	#[serde(default)]
	records: Vec<Record>,
}

#[derive(Deserialize)]
struct DescribeResponse {
	fields: Vec<DescribedField>,
}

#[derive(Deserialize)]
struct DescribedField {
	name: String,
	#[serde(default, rename = "picklistValues")]
	picklist_values: Vec<PicklistEntry>,
}

#[derive(Deserialize)]
struct PicklistEntry {
	#[serde(default)]
	label: Option<String>,
	value: String,
	#[serde(default = "default_active")]
	active: bool,
}

fn default_active() -> bool {
	true
}

impl<C, M> Gateway<C, M>
where
	C: ?Sized + GatewayHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Fetches one page of records and the total match count.
	///
	/// Unknown object types and undeclared filters fail before any network call.
	pub async fn query(&self, request: QueryRequest) -> Result<QueryPage> {
		const KIND: Operation = Operation::Query;

		let span = OperationSpan::new(KIND, "query");

		obs::record_outcome(KIND, OperationOutcome::Attempt);

		let result = span
			.instrument(async move {
				let object = self.catalog.resolve(&request.object_type)?;
				let built = query::build_query(object, &request)?;
				let (page, count) = futures::try_join!(
					self.execute(self.query_request(built.records)),
					self.execute(self.query_request(built.count)),
				)?;
				let page = page.json::<QueryResponse>("query")?;
				let count = count.json::<QueryResponse>("query")?;

				Ok(QueryPage {
					records: page.records.into_iter().map(strip_attributes).collect(),
					total_size: count.total_size,
				})
			})
			.await;

		obs::record_result(KIND, &result);

		result
	}

	/// Lists the active picklist entries of `field_name` on `object_type`.
	///
	/// A field the object does not have yields an empty list.
	pub async fn describe_field(
		&self,
		object_type: &str,
		field_name: &str,
	) -> Result<Vec<PicklistOption>> {
		const KIND: Operation = Operation::Describe;

		let span = OperationSpan::new(KIND, "describe_field");

		obs::record_outcome(KIND, OperationOutcome::Attempt);

		let result = span
			.instrument(async move {
				let object = self.catalog.resolve(object_type)?;
				let path = self.config.data_path(&format!("sobjects/{}/describe", object.api_name));
				let response = self
					.execute(
						DataRequest::get(path).tenant_scoped(self.config.tenant_header.is_some()),
					)
					.await?
					.json::<DescribeResponse>("describe")?;
				let options = response
					.fields
					.into_iter()
					.find(|field| field.name.eq_ignore_ascii_case(field_name))
					.map(|field| {
						field
							.picklist_values
							.into_iter()
							.filter(|entry| entry.active)
							.map(|entry| PicklistOption {
								label: entry.label.unwrap_or_else(|| entry.value.clone()),
								value: entry.value,
							})
							.collect()
					})
					.unwrap_or_default();

				Ok(options)
			})
			.await;

		obs::record_result(KIND, &result);

		result
	}

	fn query_request(&self, soql: String) -> DataRequest {
		DataRequest::get(self.config.data_path("query"))
			.query_param("q", soql)
			.tenant_scoped(self.config.tenant_header.is_some())
	}
}

fn strip_attributes(mut record: Record) -> Record {
	record.remove("attributes");

	record
}
