// Copyright 2025 MeshRPC Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The demo service exported by `meshrpc serve`.

use anyhow::anyhow;
use meshrpc_common::RpcArgs;
use meshrpc_server::Provider;
use serde_json::{json, Value};
use std::time::Duration;

pub const ECHO_INTERFACE: &str = "meshrpc.demo.Echo";

/// Provider for [`ECHO_INTERFACE`] with four methods:
///
/// - `echo(value)`: returns its first argument (`null` without one)
/// - `add(a, b, ...)`: sum of integer arguments
/// - `fail(message?)`: always fails with a business error
/// - `sleep(ms)`: waits, then returns `ms`
pub fn echo_provider() -> Provider {
    Provider::builder(ECHO_INTERFACE)
        .method("echo", |args| Ok(args.into_iter().next().unwrap_or(Value::Null)))
        .method("add", add)
        .method("fail", |args| {
            let message = args
                .first()
                .and_then(Value::as_str)
                .unwrap_or("failure requested");
            Err(anyhow!("{}", message))
        })
        .async_method("sleep", |args| async move {
            let ms = args
                .first()
                .and_then(Value::as_u64)
                .ok_or_else(|| anyhow!("sleep expects milliseconds"))?;
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(json!(ms))
        })
        .build()
}

fn add(args: RpcArgs) -> anyhow::Result<Value> {
    let sum = args
        .iter()
        .map(|v| v.as_i64().ok_or_else(|| anyhow!("add expects integers, got {}", v)))
        .sum::<anyhow::Result<i64>>()?;
    Ok(json!(sum))
}
