//! Built-in blueprints for the stocks service.
//!
//! - `api`: the REST API and its top-level resources; publishes their ids.
//! - `integrations`: deployment, stage, usage plan, and API key.
//! - `lambdas`: the pattern function behind `/webhook/harmonic-pattern`.
//! - `jobs`: the order-sync function behind `/sync/orders` and its nightly
//!   schedule.
//!
//! Every stack after `api` reaches the API through deferred references, so
//! `api` must be realized first.

use stackwire_common::error::Result;
use stackwire_graph::kinds::{Function, ResourceHandle, Role};
use stackwire_graph::{InputVariable, PropertyValue};

use crate::catalog::{self, Declared, FunctionCode, Policy};
use crate::section::SectionContext;

pub mod api;
pub mod integrations;
pub mod jobs;
pub mod lambdas;

/// Store key of the REST API id.
pub const API_ID_KEY: &str = "/stocks/api/id";
/// Store key of the API's root resource id.
pub const API_ROOT_RESOURCE_KEY: &str = "/stocks/api/parent/resource/id";
/// Store key of the `/webhook` resource id.
pub const WEBHOOK_RESOURCE_KEY: &str = "/stocks/webhook/resource/id";
/// Store key of the `/sync` resource id.
pub const SYNC_RESOURCE_KEY: &str = "/stocks/sync/resource/id";

const LAMBDA_RUNTIME: &str = "provided.al2023";
const LAMBDA_HANDLER: &str = "handler";
const BUCKET_INPUT: &str = "StockS3Bucket";

fn env(name: &str) -> String {
    format!("env-dict.{name}")
}

/// Declares the bucket holding function packages as a stack input.
fn bucket_input(ctx: &mut SectionContext<'_>) -> Result<()> {
    let bucket = ctx.require_str(&env("BucketName"))?;
    let _ = ctx.add_input(InputVariable::string(BUCKET_INPUT).with_default(bucket))?;
    Ok(())
}

/// Execution role for a function named by the `name_var` variable: read its
/// package, write its logs, read the shared secret.
fn lambda_role(
    ctx: &mut SectionContext<'_>,
    id: &str,
    prefix: &str,
    name_var: &str,
) -> Result<ResourceHandle<Role>> {
    let bucket = ctx.var(&env("BucketName"))?;
    let lambda_name = ctx.var(&env(name_var))?;
    let secret_id = ctx.var(&env("SharedSecretsId"))?;
    let policies = vec![
        Policy::new(format!("{prefix}S3Policy")).allow(
            ["s3:GetObject"],
            [PropertyValue::sub("arn:aws:s3:::${BucketName}/*", [("BucketName", bucket)])],
        ),
        Policy::new(format!("{prefix}LogPolicy"))
            .allow(
                ["logs:CreateLogGroup"],
                [PropertyValue::sub(
                    "arn:aws:logs:${AWS::Region}:${AWS::AccountId}:*",
                    Vec::<(String, PropertyValue)>::new(),
                )],
            )
            .allow(
                ["logs:CreateLogStream", "logs:PutLogEvents"],
                [PropertyValue::sub(
                    "arn:aws:logs:${AWS::Region}:${AWS::AccountId}:log-group:/aws/lambda/${LambdaName}:*",
                    [("LambdaName", lambda_name)],
                )],
            ),
        Policy::new(format!("{prefix}SecretsManagerPolicy")).allow(
            ["secretsmanager:GetSecretValue"],
            [PropertyValue::sub(
                "arn:aws:secretsmanager:${AWS::Region}:${AWS::AccountId}:secret:${SecretId}-5BII06",
                [("SecretId", secret_id)],
            )],
        ),
    ];
    ctx.add(catalog::role(
        id,
        &["lambda.amazonaws.com", "apigateway.amazonaws.com"],
        policies,
    ))
}

/// A function whose package is `lambdas/<name>.zip` in the bucket input.
fn packaged_function(
    ctx: &SectionContext<'_>,
    id: &str,
    name_var: &str,
    role: &ResourceHandle<Role>,
) -> Result<Declared<Function>> {
    let name = ctx.var(&env(name_var))?;
    let code = FunctionCode {
        bucket: PropertyValue::Input(BUCKET_INPUT.into()),
        key: PropertyValue::sub("lambdas/${LambdaName}.zip", [("LambdaName", name.clone())]),
    };
    Ok(
        catalog::function(id, name, role, code, LAMBDA_HANDLER, LAMBDA_RUNTIME)
            .environment([("SHARED_SECRETS", ctx.var(&env("SharedSecretsId"))?)]),
    )
}
