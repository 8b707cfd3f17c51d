//! AWS API client implementation.
//!
//! Calls the EC2 and RDS Query APIs with JSON bodies. Request signing is
//! left to the transport in front of the endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use tracing::{debug, info, warn};
use url::Url;

use super::models::{
    AssociateRouteTableRequest, AttributeBooleanValue, AuthorizeIngressRequest,
    CreateDbInstanceRequest, CreateDbInstanceResponse, CreateDbSubnetGroupRequest,
    CreateDbSubnetGroupResponse, CreateInternetGatewayResponse, CreateRouteRequest,
    CreateRouteTableRequest, CreateRouteTableResponse, CreateSecurityGroupRequest,
    CreateSecurityGroupResponse, CreateSubnetRequest, CreateSubnetResponse, CreateTagsRequest,
    CreateVpcRequest, CreateVpcResponse, DescribeRouteTablesResponse, ErrorResponse,
    GatewayAttachmentRequest, IpPermission, IpRange, ModifySubnetAttributeRequest,
    RunInstancesRequest, RunInstancesResponse, Tag, TagSpecification, UserIdGroupPair,
};
use crate::providers::traits::{
    CloudProviderError, CreateDatabaseRequest, InfraProvider, IngressRule, LaunchInstanceRequest,
    Route, RuleSource, SecurityGroupRequest,
};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// EC2 Query API version.
const EC2_API_VERSION: &str = "2016-11-15";

/// RDS Query API version.
const RDS_API_VERSION: &str = "2014-10-31";

/// AWS infrastructure provider.
#[derive(Clone)]
pub struct Aws {
    /// HTTP client.
    client: Client,
    /// AWS region.
    region: String,
    /// Base URL used for every service instead of the regional endpoints.
    endpoint_override: Option<String>,
}

impl Aws {
    /// Create a new AWS provider.
    ///
    /// # Arguments
    /// * `region` - AWS region (e.g., "us-east-1")
    ///
    /// # Errors
    /// Returns error if HTTP client cannot be created.
    pub fn new(region: impl Into<String>) -> Result<Self, CloudProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(CloudProviderError::Http)?;

        Ok(Self {
            client,
            region: region.into(),
            endpoint_override: None,
        })
    }

    /// Send every request to `endpoint` (e.g., a local emulator).
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint_override = Some(endpoint.into());
        self
    }

    /// Region this client talks to.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Get EC2 API endpoint.
    fn ec2_endpoint(&self) -> String {
        self.endpoint_override
            .clone()
            .unwrap_or_else(|| format!("https://ec2.{}.amazonaws.com", self.region))
    }

    /// Get RDS API endpoint.
    fn rds_endpoint(&self) -> String {
        self.endpoint_override
            .clone()
            .unwrap_or_else(|| format!("https://rds.{}.amazonaws.com", self.region))
    }

    /// Build a Query API URL for `action`.
    fn action_url(
        endpoint: &str,
        version: &str,
        action: &str,
        params: &[(&str, &str)],
    ) -> Result<Url, CloudProviderError> {
        let base = format!("{}/", endpoint.trim_end_matches('/'));
        let mut query = vec![("Action", action), ("Version", version)];
        query.extend_from_slice(params);
        Url::parse_with_params(&base, &query)
            .map_err(|e| CloudProviderError::Config(format!("Invalid endpoint {endpoint}: {e}")))
    }

    fn ec2_url(&self, action: &str, params: &[(&str, &str)]) -> Result<Url, CloudProviderError> {
        Self::action_url(&self.ec2_endpoint(), EC2_API_VERSION, action, params)
    }

    fn rds_url(&self, action: &str, params: &[(&str, &str)]) -> Result<Url, CloudProviderError> {
        Self::action_url(&self.rds_endpoint(), RDS_API_VERSION, action, params)
    }

    /// Execute an AWS request.
    async fn aws_request<T: serde::de::DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<&impl serde::Serialize>,
    ) -> Result<T, CloudProviderError> {
        debug!(url = %url, method = %method, "AWS request");

        let mut request = self.client.request(method, url);
        request = request.header("Content-Type", "application/json").header(
            "X-Amz-Date",
            chrono::Utc::now().format("%Y%m%dT%H%M%SZ").to_string(),
        );

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        Self::handle_response(response).await
    }

    /// Execute a request whose response body is not needed.
    async fn aws_call(
        &self,
        url: Url,
        body: Option<&impl serde::Serialize>,
    ) -> Result<(), CloudProviderError> {
        self.aws_request::<serde_json::Value>(Method::POST, url, body)
            .await
            .map(|_| ())
    }

    /// Handle API response.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, CloudProviderError> {
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            let text = if text.trim().is_empty() {
                "null"
            } else {
                text.as_str()
            };
            serde_json::from_str(text).map_err(|e| {
                warn!(error = %e, body = %text, "Failed to parse response");
                CloudProviderError::Serialization(e)
            })
        } else {
            Err(Self::error_from_response(status, text))
        }
    }

    /// Map an error response to a provider error.
    ///
    /// The error code in the body wins over the HTTP status, since EC2
    /// reports most client errors as plain 400s.
    fn error_from_response(status: StatusCode, text: String) -> CloudProviderError {
        if let Ok(ErrorResponse { error }) = serde_json::from_str::<ErrorResponse>(&text) {
            let code = error.code.as_str();
            let message = format!("{code}: {}", error.message);
            if code.ends_with(".NotFound") || code.ends_with("NotFoundFault") {
                return CloudProviderError::NotFound(message);
            }
            if code == "DependencyViolation" || code.starts_with("InvalidDBSubnetGroupState") {
                return CloudProviderError::DependencyViolation(message);
            }
            if matches!(
                code,
                "RequestLimitExceeded" | "Throttling" | "ThrottlingException"
            ) {
                return CloudProviderError::Throttled(message);
            }
            if code.ends_with("LimitExceeded") || code.contains("Quota") {
                return CloudProviderError::QuotaExceeded(message);
            }
        }

        if status == StatusCode::NOT_FOUND {
            CloudProviderError::NotFound(text)
        } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            CloudProviderError::Auth(text)
        } else if status == StatusCode::TOO_MANY_REQUESTS {
            CloudProviderError::Throttled(text)
        } else {
            CloudProviderError::Api {
                status: status.as_u16(),
                message: text,
            }
        }
    }

    /// Convert an ingress rule to an EC2 permission.
    fn to_ip_permission(rule: &IngressRule) -> IpPermission {
        let (ip_ranges, user_id_group_pairs) = match &rule.source {
            RuleSource::Cidr(cidr) => (
                vec![IpRange {
                    cidr_ip: cidr.clone(),
                }],
                Vec::new(),
            ),
            RuleSource::SecurityGroup(group_id) => (
                Vec::new(),
                vec![UserIdGroupPair {
                    group_id: group_id.clone(),
                }],
            ),
        };

        IpPermission {
            ip_protocol: "tcp".to_string(),
            from_port: rule.port,
            to_port: rule.port,
            ip_ranges,
            user_id_group_pairs,
        }
    }
}

#[async_trait]
impl InfraProvider for Aws {
    // ========================================================================
    // VPC operations
    // ========================================================================

    async fn create_network(&self, cidr: &str) -> Result<String, CloudProviderError> {
        info!(cidr = %cidr, region = %self.region, "Creating VPC");

        let body = CreateVpcRequest {
            cidr_block: cidr.to_string(),
        };
        let response: CreateVpcResponse = self
            .aws_request(Method::POST, self.ec2_url("CreateVpc", &[])?, Some(&body))
            .await?;

        info!(vpc_id = %response.vpc.vpc_id, "VPC created");
        Ok(response.vpc.vpc_id)
    }

    async fn delete_network(&self, network_id: &str) -> Result<(), CloudProviderError> {
        info!(vpc_id = %network_id, "Deleting VPC");
        self.aws_call(
            self.ec2_url("DeleteVpc", &[("VpcId", network_id)])?,
            None::<&()>,
        )
        .await
    }

    async fn tag_resource(&self, resource_id: &str, name: &str) -> Result<(), CloudProviderError> {
        debug!(resource_id = %resource_id, name = %name, "Tagging resource");

        let body = CreateTagsRequest {
            resources: vec![resource_id.to_string()],
            tags: vec![Tag {
                key: "Name".to_string(),
                value: name.to_string(),
            }],
        };
        self.aws_call(self.ec2_url("CreateTags", &[])?, Some(&body))
            .await
    }

    async fn create_gateway(&self) -> Result<String, CloudProviderError> {
        info!("Creating internet gateway");

        let response: CreateInternetGatewayResponse = self
            .aws_request(
                Method::POST,
                self.ec2_url("CreateInternetGateway", &[])?,
                None::<&()>,
            )
            .await?;

        let id = response.internet_gateway.internet_gateway_id;
        info!(igw_id = %id, "Internet gateway created");
        Ok(id)
    }

    async fn attach_gateway(
        &self,
        gateway_id: &str,
        network_id: &str,
    ) -> Result<(), CloudProviderError> {
        info!(igw_id = %gateway_id, vpc_id = %network_id, "Attaching internet gateway");

        let body = GatewayAttachmentRequest {
            internet_gateway_id: gateway_id.to_string(),
            vpc_id: network_id.to_string(),
        };
        self.aws_call(self.ec2_url("AttachInternetGateway", &[])?, Some(&body))
            .await
    }

    async fn detach_gateway(
        &self,
        gateway_id: &str,
        network_id: &str,
    ) -> Result<(), CloudProviderError> {
        info!(igw_id = %gateway_id, vpc_id = %network_id, "Detaching internet gateway");

        let body = GatewayAttachmentRequest {
            internet_gateway_id: gateway_id.to_string(),
            vpc_id: network_id.to_string(),
        };
        self.aws_call(self.ec2_url("DetachInternetGateway", &[])?, Some(&body))
            .await
    }

    async fn delete_gateway(&self, gateway_id: &str) -> Result<(), CloudProviderError> {
        info!(igw_id = %gateway_id, "Deleting internet gateway");
        self.aws_call(
            self.ec2_url("DeleteInternetGateway", &[("InternetGatewayId", gateway_id)])?,
            None::<&()>,
        )
        .await
    }

    async fn create_subnet(
        &self,
        network_id: &str,
        cidr: &str,
        zone: &str,
    ) -> Result<String, CloudProviderError> {
        info!(vpc_id = %network_id, cidr = %cidr, zone = %zone, "Creating subnet");

        let body = CreateSubnetRequest {
            vpc_id: network_id.to_string(),
            cidr_block: cidr.to_string(),
            availability_zone: zone.to_string(),
        };
        let response: CreateSubnetResponse = self
            .aws_request(Method::POST, self.ec2_url("CreateSubnet", &[])?, Some(&body))
            .await?;

        info!(subnet_id = %response.subnet.subnet_id, "Subnet created");
        Ok(response.subnet.subnet_id)
    }

    async fn enable_public_ip_on_launch(&self, subnet_id: &str) -> Result<(), CloudProviderError> {
        info!(subnet_id = %subnet_id, "Enabling public IP auto-assignment");

        let body = ModifySubnetAttributeRequest {
            subnet_id: subnet_id.to_string(),
            map_public_ip_on_launch: AttributeBooleanValue { value: true },
        };
        self.aws_call(self.ec2_url("ModifySubnetAttribute", &[])?, Some(&body))
            .await
    }

    async fn delete_subnet(&self, subnet_id: &str) -> Result<(), CloudProviderError> {
        info!(subnet_id = %subnet_id, "Deleting subnet");
        self.aws_call(
            self.ec2_url("DeleteSubnet", &[("SubnetId", subnet_id)])?,
            None::<&()>,
        )
        .await
    }

    async fn create_route_table(&self, network_id: &str) -> Result<String, CloudProviderError> {
        info!(vpc_id = %network_id, "Creating route table");

        let body = CreateRouteTableRequest {
            vpc_id: network_id.to_string(),
        };
        let response: CreateRouteTableResponse = self
            .aws_request(
                Method::POST,
                self.ec2_url("CreateRouteTable", &[])?,
                Some(&body),
            )
            .await?;
        let route_table_id = response.route_table.route_table_id;

        info!(rtb_id = %route_table_id, "Route table created");
        Ok(route_table_id)
    }

    async fn create_route(
        &self,
        route_table_id: &str,
        route: &Route,
    ) -> Result<(), CloudProviderError> {
        debug!(
            rtb_id = %route_table_id,
            destination = %route.destination,
            gateway_id = %route.gateway_id,
            "Adding route"
        );

        let body = CreateRouteRequest {
            route_table_id: route_table_id.to_string(),
            destination_cidr_block: route.destination.clone(),
            gateway_id: route.gateway_id.clone(),
        };
        self.aws_call(self.ec2_url("CreateRoute", &[])?, Some(&body))
            .await
    }

    async fn associate_route_table(
        &self,
        route_table_id: &str,
        subnet_id: &str,
    ) -> Result<(), CloudProviderError> {
        info!(rtb_id = %route_table_id, subnet_id = %subnet_id, "Associating route table");

        let body = AssociateRouteTableRequest {
            route_table_id: route_table_id.to_string(),
            subnet_id: subnet_id.to_string(),
        };
        self.aws_call(self.ec2_url("AssociateRouteTable", &[])?, Some(&body))
            .await
    }

    async fn delete_route_table(&self, route_table_id: &str) -> Result<(), CloudProviderError> {
        info!(rtb_id = %route_table_id, "Deleting route table");

        // A table with subnet associations cannot be deleted.
        let described: DescribeRouteTablesResponse = self
            .aws_request(
                Method::GET,
                self.ec2_url(
                    "DescribeRouteTables",
                    &[("RouteTableId.1", route_table_id)],
                )?,
                None::<&()>,
            )
            .await?;

        let table = described
            .route_tables
            .into_iter()
            .find(|t| t.route_table_id == route_table_id)
            .ok_or_else(|| {
                CloudProviderError::NotFound(format!("Route table not found: {route_table_id}"))
            })?;

        for association in table.associations.iter().filter(|a| !a.main) {
            debug!(
                rtb_id = %route_table_id,
                association_id = %association.route_table_association_id,
                "Disassociating route table"
            );
            self.aws_call(
                self.ec2_url(
                    "DisassociateRouteTable",
                    &[(
                        "AssociationId",
                        association.route_table_association_id.as_str(),
                    )],
                )?,
                None::<&()>,
            )
            .await?;
        }

        self.aws_call(
            self.ec2_url("DeleteRouteTable", &[("RouteTableId", route_table_id)])?,
            None::<&()>,
        )
        .await
    }

    // ========================================================================
    // Security group operations
    // ========================================================================

    async fn create_security_group(
        &self,
        network_id: &str,
        req: &SecurityGroupRequest,
    ) -> Result<String, CloudProviderError> {
        info!(vpc_id = %network_id, name = %req.name, "Creating security group");

        let body = CreateSecurityGroupRequest {
            group_name: req.name.clone(),
            description: req.description.clone(),
            vpc_id: network_id.to_string(),
        };
        let response: CreateSecurityGroupResponse = self
            .aws_request(
                Method::POST,
                self.ec2_url("CreateSecurityGroup", &[])?,
                Some(&body),
            )
            .await?;
        let group_id = response.group_id;

        info!(group_id = %group_id, "Security group created");
        Ok(group_id)
    }

    async fn authorize_ingress(
        &self,
        group_id: &str,
        rules: &[IngressRule],
    ) -> Result<(), CloudProviderError> {
        info!(group_id = %group_id, rules = rules.len(), "Authorizing ingress");

        let body = AuthorizeIngressRequest {
            group_id: group_id.to_string(),
            ip_permissions: rules.iter().map(Self::to_ip_permission).collect(),
        };
        self.aws_call(
            self.ec2_url("AuthorizeSecurityGroupIngress", &[])?,
            Some(&body),
        )
        .await
    }

    async fn delete_security_group(&self, group_id: &str) -> Result<(), CloudProviderError> {
        info!(group_id = %group_id, "Deleting security group");
        self.aws_call(
            self.ec2_url("DeleteSecurityGroup", &[("GroupId", group_id)])?,
            None::<&()>,
        )
        .await
    }

    // ========================================================================
    // EC2 (Instance) operations
    // ========================================================================

    async fn launch_instance(
        &self,
        security_group_id: &str,
        subnet_id: &str,
        req: &LaunchInstanceRequest,
    ) -> Result<String, CloudProviderError> {
        info!(
            name = %req.name,
            instance_type = %req.instance_type,
            subnet_id = %subnet_id,
            "Launching EC2 instance"
        );

        let body = RunInstancesRequest {
            image_id: req.image_id.clone(),
            instance_type: req.instance_type.clone(),
            min_count: 1,
            max_count: 1,
            key_name: req.key_name.clone(),
            security_group_ids: vec![security_group_id.to_string()],
            subnet_id: subnet_id.to_string(),
            client_token: uuid::Uuid::new_v4().to_string(),
            tag_specifications: Some(vec![TagSpecification {
                resource_type: "instance".to_string(),
                tags: vec![Tag {
                    key: "Name".to_string(),
                    value: req.name.clone(),
                }],
            }]),
        };

        let response: RunInstancesResponse = self
            .aws_request(Method::POST, self.ec2_url("RunInstances", &[])?, Some(&body))
            .await?;

        let instance = response
            .instances
            .into_iter()
            .next()
            .ok_or_else(|| CloudProviderError::Api {
                status: 500,
                message: "No instance returned from launch".to_string(),
            })?;

        info!(instance_id = %instance.instance_id, "EC2 instance launched");
        Ok(instance.instance_id)
    }

    async fn terminate_instance(&self, instance_id: &str) -> Result<(), CloudProviderError> {
        info!(instance_id = %instance_id, "Terminating instance");
        self.aws_call(
            self.ec2_url("TerminateInstances", &[("InstanceId.1", instance_id)])?,
            None::<&()>,
        )
        .await
    }

    // ========================================================================
    // RDS operations
    // ========================================================================

    async fn create_database_subnet_group(
        &self,
        name: &str,
        network_id: &str,
        subnet_ids: &[String],
    ) -> Result<String, CloudProviderError> {
        info!(
            name = %name,
            vpc_id = %network_id,
            subnets = subnet_ids.len(),
            "Creating DB subnet group"
        );

        let body = CreateDbSubnetGroupRequest {
            db_subnet_group_name: name.to_string(),
            db_subnet_group_description: format!("Subnet group for {network_id}"),
            subnet_ids: subnet_ids.to_vec(),
        };
        let response: CreateDbSubnetGroupResponse = self
            .aws_request(
                Method::POST,
                self.rds_url("CreateDBSubnetGroup", &[])?,
                Some(&body),
            )
            .await?;

        Ok(response.db_subnet_group.db_subnet_group_name)
    }

    async fn delete_database_subnet_group(&self, name: &str) -> Result<(), CloudProviderError> {
        info!(name = %name, "Deleting DB subnet group");
        self.aws_call(
            self.rds_url("DeleteDBSubnetGroup", &[("DBSubnetGroupName", name)])?,
            None::<&()>,
        )
        .await
    }

    async fn create_database_instance(
        &self,
        security_group_id: &str,
        subnet_group_name: &str,
        req: &CreateDatabaseRequest,
    ) -> Result<String, CloudProviderError> {
        info!(
            identifier = %req.identifier,
            engine = %req.engine,
            instance_class = %req.instance_class,
            "Creating DB instance"
        );

        let body = CreateDbInstanceRequest {
            db_instance_identifier: req.identifier.clone(),
            engine: req.engine.clone(),
            db_instance_class: req.instance_class.clone(),
            allocated_storage: req.allocated_storage_gb,
            master_username: req.master_username.clone(),
            master_user_password: req.master_password.clone(),
            vpc_security_group_ids: vec![security_group_id.to_string()],
            db_subnet_group_name: subnet_group_name.to_string(),
            publicly_accessible: false,
        };
        let response: CreateDbInstanceResponse = self
            .aws_request(
                Method::POST,
                self.rds_url("CreateDBInstance", &[])?,
                Some(&body),
            )
            .await?;

        info!(
            identifier = %response.db_instance.db_instance_identifier,
            status = ?response.db_instance.db_instance_status,
            "DB instance creation initiated"
        );
        Ok(response.db_instance.db_instance_identifier)
    }

    async fn delete_database_instance(&self, identifier: &str) -> Result<(), CloudProviderError> {
        info!(identifier = %identifier, "Deleting DB instance");
        self.aws_call(
            self.rds_url(
                "DeleteDBInstance",
                &[
                    ("DBInstanceIdentifier", identifier),
                    ("SkipFinalSnapshot", "true"),
                ],
            )?,
            None::<&()>,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let not_found = Aws::error_from_response(
            StatusCode::BAD_REQUEST,
            r#"{"Error":{"Code":"InvalidVpcID.NotFound","Message":"The vpc ID 'vpc-1' does not exist"}}"#
                .to_string(),
        );
        assert!(not_found.is_not_found());

        let dependency = Aws::error_from_response(
            StatusCode::BAD_REQUEST,
            r#"{"Error":{"Code":"DependencyViolation","Message":"has dependencies"}}"#.to_string(),
        );
        assert!(matches!(dependency, CloudProviderError::DependencyViolation(_)));

        let quota = Aws::error_from_response(
            StatusCode::BAD_REQUEST,
            r#"{"Error":{"Code":"InstanceLimitExceeded","Message":"limit"}}"#.to_string(),
        );
        assert!(matches!(quota, CloudProviderError::QuotaExceeded(_)));

        let throttled = Aws::error_from_response(
            StatusCode::SERVICE_UNAVAILABLE,
            r#"{"Error":{"Code":"RequestLimitExceeded","Message":"slow down"}}"#.to_string(),
        );
        assert!(throttled.is_transient());
    }

    #[test]
    fn test_status_fallback_mapping() {
        assert!(matches!(
            Aws::error_from_response(StatusCode::FORBIDDEN, "denied".to_string()),
            CloudProviderError::Auth(_)
        ));
        assert!(matches!(
            Aws::error_from_response(StatusCode::INTERNAL_SERVER_ERROR, "boom".to_string()),
            CloudProviderError::Api { status: 500, .. }
        ));
    }

    #[test]
    fn test_ip_permission_mapping() {
        let ssh = Aws::to_ip_permission(&IngressRule::from_cidr(22, "203.0.113.7/32"));
        assert_eq!(ssh.from_port, 22);
        assert_eq!(ssh.to_port, 22);
        assert_eq!(ssh.ip_ranges[0].cidr_ip, "203.0.113.7/32");
        assert!(ssh.user_id_group_pairs.is_empty());

        let db = Aws::to_ip_permission(&IngressRule::from_group(3306, "sg-123"));
        assert!(db.ip_ranges.is_empty());
        assert_eq!(db.user_id_group_pairs[0].group_id, "sg-123");
    }

    #[test]
    fn test_action_url() {
        let url = Aws::action_url(
            "http://localhost:4566/",
            EC2_API_VERSION,
            "DeleteVpc",
            &[("VpcId", "vpc-1")],
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:4566/?Action=DeleteVpc&Version=2016-11-15&VpcId=vpc-1"
        );
    }
}
