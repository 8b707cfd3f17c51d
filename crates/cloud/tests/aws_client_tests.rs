//! Integration tests for the AWS client against a mock Query API endpoint.

use bastion_cloud::aws::Aws;
use bastion_cloud::{
    CloudProviderError, InfraProvider, IngressRule, LaunchInstanceRequest, Route,
    SecurityGroupRequest,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> Aws {
    Aws::new("us-east-1")
        .expect("client builds")
        .with_endpoint(server.uri())
}

#[tokio::test]
async fn test_create_network_returns_vpc_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(query_param("Action", "CreateVpc"))
        .and(query_param("Version", "2016-11-15"))
        .and(body_partial_json(json!({"CidrBlock": "10.0.0.0/16"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Vpc": {"VpcId": "vpc-0abc", "CidrBlock": "10.0.0.0/16", "State": "pending"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let aws = client_for(&server);
    let vpc_id = aws.create_network("10.0.0.0/16").await.unwrap();
    assert_eq!(vpc_id, "vpc-0abc");
}

#[tokio::test]
async fn test_not_found_error_code_is_mapped() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(query_param("Action", "DeleteSubnet"))
        .and(query_param("SubnetId", "subnet-gone"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "Error": {
                "Code": "InvalidSubnetID.NotFound",
                "Message": "The subnet ID 'subnet-gone' does not exist"
            }
        })))
        .mount(&server)
        .await;

    let aws = client_for(&server);
    let err = aws.delete_subnet("subnet-gone").await.unwrap_err();
    assert!(err.is_not_found());
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(query_param("Action", "TerminateInstances"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;

    let aws = client_for(&server);
    let err = aws.terminate_instance("i-1").await.unwrap_err();
    assert!(matches!(err, CloudProviderError::Api { status: 503, .. }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_create_security_group_makes_one_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(query_param("Action", "CreateSecurityGroup"))
        .and(body_partial_json(json!({"GroupName": "bastion-ec2-sg", "VpcId": "vpc-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"GroupId": "sg-42"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(query_param("Action", "AuthorizeSecurityGroupIngress"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Return": true})))
        .expect(0)
        .mount(&server)
        .await;

    let aws = client_for(&server);
    let group_id = aws
        .create_security_group(
            "vpc-1",
            &SecurityGroupRequest {
                name: "bastion-ec2-sg".to_string(),
                description: "Access for bastion host".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(group_id, "sg-42");
}

#[tokio::test]
async fn test_authorize_ingress_sends_permissions() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(query_param("Action", "AuthorizeSecurityGroupIngress"))
        .and(body_partial_json(json!({
            "GroupId": "sg-42",
            "IpPermissions": [{
                "IpProtocol": "tcp",
                "FromPort": 22,
                "ToPort": 22,
                "IpRanges": [{"CidrIp": "0.0.0.0/0"}]
            }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Return": true})))
        .expect(1)
        .mount(&server)
        .await;

    let aws = client_for(&server);
    aws.authorize_ingress("sg-42", &[IngressRule::from_cidr(22, "0.0.0.0/0")])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_create_route_table_makes_one_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(query_param("Action", "CreateRouteTable"))
        .and(body_partial_json(json!({"VpcId": "vpc-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "RouteTable": {"RouteTableId": "rtb-7", "Associations": []}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let aws = client_for(&server);
    let rtb = aws.create_route_table("vpc-1").await.unwrap();
    assert_eq!(rtb, "rtb-7");
}

#[tokio::test]
async fn test_create_route_targets_gateway() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(query_param("Action", "CreateRoute"))
        .and(body_partial_json(json!({
            "RouteTableId": "rtb-7",
            "DestinationCidrBlock": "0.0.0.0/0",
            "GatewayId": "igw-3"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Return": true})))
        .expect(1)
        .mount(&server)
        .await;

    let aws = client_for(&server);
    let route = Route {
        destination: "0.0.0.0/0".to_string(),
        gateway_id: "igw-3".to_string(),
    };
    aws.create_route("rtb-7", &route).await.unwrap();
}

#[tokio::test]
async fn test_delete_route_table_disassociates_subnets_first() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("Action", "DescribeRouteTables"))
        .and(query_param("RouteTableId.1", "rtb-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "RouteTables": [{
                "RouteTableId": "rtb-9",
                "Associations": [
                    {"RouteTableAssociationId": "rtbassoc-1", "Main": false, "SubnetId": "subnet-1"},
                    {"RouteTableAssociationId": "rtbassoc-main", "Main": true}
                ]
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(query_param("Action", "DisassociateRouteTable"))
        .and(query_param("AssociationId", "rtbassoc-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Return": true})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(query_param("Action", "DeleteRouteTable"))
        .and(query_param("RouteTableId", "rtb-9"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let aws = client_for(&server);
    aws.delete_route_table("rtb-9").await.unwrap();
}

#[tokio::test]
async fn test_launch_without_instances_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(query_param("Action", "RunInstances"))
        .and(body_partial_json(json!({
            "SubnetId": "subnet-pub",
            "SecurityGroupIds": ["sg-1"],
            "MinCount": 1,
            "MaxCount": 1
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Instances": []})))
        .mount(&server)
        .await;

    let aws = client_for(&server);
    let err = aws
        .launch_instance(
            "sg-1",
            "subnet-pub",
            &LaunchInstanceRequest {
                name: "bastion-ec2".to_string(),
                image_id: "ami-123".to_string(),
                instance_type: "t2.micro".to_string(),
                key_name: Some("bastion-key".to_string()),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CloudProviderError::Api { status: 500, .. }));
}

#[tokio::test]
async fn test_delete_database_skips_final_snapshot() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(query_param("Action", "DeleteDBInstance"))
        .and(query_param("Version", "2014-10-31"))
        .and(query_param("DBInstanceIdentifier", "bastion-db-instance"))
        .and(query_param("SkipFinalSnapshot", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "DBInstance": {"DBInstanceIdentifier": "bastion-db-instance", "DBInstanceStatus": "deleting"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let aws = client_for(&server);
    aws.delete_database_instance("bastion-db-instance")
        .await
        .unwrap();
}
