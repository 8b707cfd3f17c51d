//! AWS API request and response models.

use serde::{Deserialize, Serialize};

// ============================================================================
// Error envelope
// ============================================================================

/// Error response body.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    /// Error details.
    #[serde(rename = "Error")]
    pub error: ErrorDetail,
}

/// Error code and message.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorDetail {
    /// Error code (e.g., "InvalidVpcID.NotFound").
    #[serde(rename = "Code")]
    pub code: String,
    /// Human-readable message.
    #[serde(rename = "Message", default)]
    pub message: String,
}

// ============================================================================
// VPC types
// ============================================================================

/// Create VPC request.
#[derive(Debug, Serialize)]
pub struct CreateVpcRequest {
    /// Address range.
    #[serde(rename = "CidrBlock")]
    pub cidr_block: String,
}

/// Create VPC response.
#[derive(Debug, Deserialize)]
pub struct CreateVpcResponse {
    /// Created VPC.
    #[serde(rename = "Vpc")]
    pub vpc: Vpc,
}

/// VPC information.
#[derive(Debug, Clone, Deserialize)]
pub struct Vpc {
    /// VPC ID.
    #[serde(rename = "VpcId")]
    pub vpc_id: String,
    /// Address range.
    #[serde(rename = "CidrBlock")]
    pub cidr_block: Option<String>,
    /// State.
    #[serde(rename = "State")]
    pub state: Option<String>,
}

/// Tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    /// Tag key.
    #[serde(rename = "Key")]
    pub key: String,
    /// Tag value.
    #[serde(rename = "Value")]
    pub value: String,
}

/// Create tags request.
#[derive(Debug, Serialize)]
pub struct CreateTagsRequest {
    /// Resource IDs to tag.
    #[serde(rename = "Resources")]
    pub resources: Vec<String>,
    /// Tags to set.
    #[serde(rename = "Tags")]
    pub tags: Vec<Tag>,
}

/// Tag specification for resource creation.
#[derive(Debug, Serialize)]
pub struct TagSpecification {
    /// Resource type.
    #[serde(rename = "ResourceType")]
    pub resource_type: String,
    /// Tags.
    #[serde(rename = "Tags")]
    pub tags: Vec<Tag>,
}

// ============================================================================
// Internet gateway types
// ============================================================================

/// Create internet gateway response.
#[derive(Debug, Deserialize)]
pub struct CreateInternetGatewayResponse {
    /// Created gateway.
    #[serde(rename = "InternetGateway")]
    pub internet_gateway: InternetGateway,
}

/// Internet gateway information.
#[derive(Debug, Clone, Deserialize)]
pub struct InternetGateway {
    /// Gateway ID.
    #[serde(rename = "InternetGatewayId")]
    pub internet_gateway_id: String,
}

/// Attach/detach internet gateway request.
#[derive(Debug, Serialize)]
pub struct GatewayAttachmentRequest {
    /// Gateway ID.
    #[serde(rename = "InternetGatewayId")]
    pub internet_gateway_id: String,
    /// VPC ID.
    #[serde(rename = "VpcId")]
    pub vpc_id: String,
}

// ============================================================================
// Subnet types
// ============================================================================

/// Create subnet request.
#[derive(Debug, Serialize)]
pub struct CreateSubnetRequest {
    /// VPC ID.
    #[serde(rename = "VpcId")]
    pub vpc_id: String,
    /// Address range.
    #[serde(rename = "CidrBlock")]
    pub cidr_block: String,
    /// Availability zone.
    #[serde(rename = "AvailabilityZone")]
    pub availability_zone: String,
}

/// Create subnet response.
#[derive(Debug, Deserialize)]
pub struct CreateSubnetResponse {
    /// Created subnet.
    #[serde(rename = "Subnet")]
    pub subnet: Subnet,
}

/// Subnet information.
#[derive(Debug, Clone, Deserialize)]
pub struct Subnet {
    /// Subnet ID.
    #[serde(rename = "SubnetId")]
    pub subnet_id: String,
    /// Availability zone.
    #[serde(rename = "AvailabilityZone")]
    pub availability_zone: Option<String>,
}

/// Boolean attribute wrapper.
#[derive(Debug, Serialize)]
pub struct AttributeBooleanValue {
    /// Value.
    #[serde(rename = "Value")]
    pub value: bool,
}

/// Modify subnet attribute request.
#[derive(Debug, Serialize)]
pub struct ModifySubnetAttributeRequest {
    /// Subnet ID.
    #[serde(rename = "SubnetId")]
    pub subnet_id: String,
    /// Auto-assign public IPv4 addresses.
    #[serde(rename = "MapPublicIpOnLaunch")]
    pub map_public_ip_on_launch: AttributeBooleanValue,
}

// ============================================================================
// Route table types
// ============================================================================

/// Create route table request.
#[derive(Debug, Serialize)]
pub struct CreateRouteTableRequest {
    /// VPC ID.
    #[serde(rename = "VpcId")]
    pub vpc_id: String,
}

/// Create route table response.
#[derive(Debug, Deserialize)]
pub struct CreateRouteTableResponse {
    /// Created route table.
    #[serde(rename = "RouteTable")]
    pub route_table: RouteTable,
}

/// Describe route tables response.
#[derive(Debug, Deserialize)]
pub struct DescribeRouteTablesResponse {
    /// Route tables.
    #[serde(rename = "RouteTables", default)]
    pub route_tables: Vec<RouteTable>,
}

/// Route table information.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteTable {
    /// Route table ID.
    #[serde(rename = "RouteTableId")]
    pub route_table_id: String,
    /// Subnet associations.
    #[serde(rename = "Associations", default)]
    pub associations: Vec<RouteTableAssociation>,
}

/// Route table association.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteTableAssociation {
    /// Association ID.
    #[serde(rename = "RouteTableAssociationId")]
    pub route_table_association_id: String,
    /// Whether this is the VPC's main association.
    #[serde(rename = "Main", default)]
    pub main: bool,
    /// Associated subnet.
    #[serde(rename = "SubnetId")]
    pub subnet_id: Option<String>,
}

/// Create route request.
#[derive(Debug, Serialize)]
pub struct CreateRouteRequest {
    /// Route table ID.
    #[serde(rename = "RouteTableId")]
    pub route_table_id: String,
    /// Destination range.
    #[serde(rename = "DestinationCidrBlock")]
    pub destination_cidr_block: String,
    /// Target gateway.
    #[serde(rename = "GatewayId")]
    pub gateway_id: String,
}

/// Associate route table request.
#[derive(Debug, Serialize)]
pub struct AssociateRouteTableRequest {
    /// Route table ID.
    #[serde(rename = "RouteTableId")]
    pub route_table_id: String,
    /// Subnet ID.
    #[serde(rename = "SubnetId")]
    pub subnet_id: String,
}

// ============================================================================
// Security group types
// ============================================================================

/// Create security group request.
#[derive(Debug, Serialize)]
pub struct CreateSecurityGroupRequest {
    /// Group name.
    #[serde(rename = "GroupName")]
    pub group_name: String,
    /// Description.
    #[serde(rename = "Description")]
    pub description: String,
    /// VPC ID.
    #[serde(rename = "VpcId")]
    pub vpc_id: String,
}

/// Create security group response.
#[derive(Debug, Deserialize)]
pub struct CreateSecurityGroupResponse {
    /// Group ID.
    #[serde(rename = "GroupId")]
    pub group_id: String,
}

/// Authorize ingress request.
#[derive(Debug, Serialize)]
pub struct AuthorizeIngressRequest {
    /// Group ID.
    #[serde(rename = "GroupId")]
    pub group_id: String,
    /// Permissions to add.
    #[serde(rename = "IpPermissions")]
    pub ip_permissions: Vec<IpPermission>,
}

/// A single ingress permission.
#[derive(Debug, Serialize)]
pub struct IpPermission {
    /// Protocol.
    #[serde(rename = "IpProtocol")]
    pub ip_protocol: String,
    /// First port.
    #[serde(rename = "FromPort")]
    pub from_port: u16,
    /// Last port.
    #[serde(rename = "ToPort")]
    pub to_port: u16,
    /// CIDR sources.
    #[serde(rename = "IpRanges", skip_serializing_if = "Vec::is_empty")]
    pub ip_ranges: Vec<IpRange>,
    /// Security group sources.
    #[serde(rename = "UserIdGroupPairs", skip_serializing_if = "Vec::is_empty")]
    pub user_id_group_pairs: Vec<UserIdGroupPair>,
}

/// CIDR source.
#[derive(Debug, Serialize)]
pub struct IpRange {
    /// CIDR block.
    #[serde(rename = "CidrIp")]
    pub cidr_ip: String,
}

/// Security group source.
#[derive(Debug, Serialize)]
pub struct UserIdGroupPair {
    /// Group ID.
    #[serde(rename = "GroupId")]
    pub group_id: String,
}

// ============================================================================
// EC2 (Instance) types
// ============================================================================

/// Run instances request.
#[derive(Debug, Serialize)]
pub struct RunInstancesRequest {
    /// Image ID (AMI).
    #[serde(rename = "ImageId")]
    pub image_id: String,
    /// Instance type.
    #[serde(rename = "InstanceType")]
    pub instance_type: String,
    /// Minimum count.
    #[serde(rename = "MinCount")]
    pub min_count: i32,
    /// Maximum count.
    #[serde(rename = "MaxCount")]
    pub max_count: i32,
    /// Key name.
    #[serde(rename = "KeyName", skip_serializing_if = "Option::is_none")]
    pub key_name: Option<String>,
    /// Security group IDs.
    #[serde(rename = "SecurityGroupIds")]
    pub security_group_ids: Vec<String>,
    /// Subnet ID.
    #[serde(rename = "SubnetId")]
    pub subnet_id: String,
    /// Idempotency token.
    #[serde(rename = "ClientToken")]
    pub client_token: String,
    /// Tags.
    #[serde(rename = "TagSpecifications", skip_serializing_if = "Option::is_none")]
    pub tag_specifications: Option<Vec<TagSpecification>>,
}

/// Run instances response.
#[derive(Debug, Deserialize)]
pub struct RunInstancesResponse {
    /// Launched instances.
    #[serde(rename = "Instances", default)]
    pub instances: Vec<LaunchedInstance>,
}

/// Launched instance summary.
#[derive(Debug, Clone, Deserialize)]
pub struct LaunchedInstance {
    /// Instance ID.
    #[serde(rename = "InstanceId")]
    pub instance_id: String,
    /// Instance state.
    #[serde(rename = "State")]
    pub state: Option<InstanceState>,
}

/// Instance state.
#[derive(Debug, Clone, Deserialize)]
pub struct InstanceState {
    /// State code.
    #[serde(rename = "Code")]
    pub code: i32,
    /// State name.
    #[serde(rename = "Name")]
    pub name: String,
}

// ============================================================================
// RDS types
// ============================================================================

/// Create DB subnet group request.
#[derive(Debug, Serialize)]
pub struct CreateDbSubnetGroupRequest {
    /// Group name.
    #[serde(rename = "DBSubnetGroupName")]
    pub db_subnet_group_name: String,
    /// Description.
    #[serde(rename = "DBSubnetGroupDescription")]
    pub db_subnet_group_description: String,
    /// Subnet IDs.
    #[serde(rename = "SubnetIds")]
    pub subnet_ids: Vec<String>,
}

/// Create DB subnet group response.
#[derive(Debug, Deserialize)]
pub struct CreateDbSubnetGroupResponse {
    /// Created group.
    #[serde(rename = "DBSubnetGroup")]
    pub db_subnet_group: DbSubnetGroup,
}

/// DB subnet group information.
#[derive(Debug, Clone, Deserialize)]
pub struct DbSubnetGroup {
    /// Group name.
    #[serde(rename = "DBSubnetGroupName")]
    pub db_subnet_group_name: String,
    /// VPC ID.
    #[serde(rename = "VpcId")]
    pub vpc_id: Option<String>,
}

/// Create DB instance request.
#[derive(Debug, Serialize)]
pub struct CreateDbInstanceRequest {
    /// Instance identifier.
    #[serde(rename = "DBInstanceIdentifier")]
    pub db_instance_identifier: String,
    /// Engine.
    #[serde(rename = "Engine")]
    pub engine: String,
    /// Instance class.
    #[serde(rename = "DBInstanceClass")]
    pub db_instance_class: String,
    /// Storage in GiB.
    #[serde(rename = "AllocatedStorage")]
    pub allocated_storage: u32,
    /// Master user name.
    #[serde(rename = "MasterUsername")]
    pub master_username: String,
    /// Master user password.
    #[serde(rename = "MasterUserPassword")]
    pub master_user_password: String,
    /// Security groups.
    #[serde(rename = "VpcSecurityGroupIds")]
    pub vpc_security_group_ids: Vec<String>,
    /// Subnet group.
    #[serde(rename = "DBSubnetGroupName")]
    pub db_subnet_group_name: String,
    /// Reachable from outside the VPC.
    #[serde(rename = "PubliclyAccessible")]
    pub publicly_accessible: bool,
}

/// Create DB instance response.
#[derive(Debug, Deserialize)]
pub struct CreateDbInstanceResponse {
    /// Created instance.
    #[serde(rename = "DBInstance")]
    pub db_instance: DbInstance,
}

/// DB instance information.
#[derive(Debug, Clone, Deserialize)]
pub struct DbInstance {
    /// Instance identifier.
    #[serde(rename = "DBInstanceIdentifier")]
    pub db_instance_identifier: String,
    /// Status.
    #[serde(rename = "DBInstanceStatus")]
    pub db_instance_status: Option<String>,
}
