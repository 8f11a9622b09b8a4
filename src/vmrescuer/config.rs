/*
 * Copyright (C) 2025 The Vmrescuer Authors
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 * http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use std::env;

const DNS_LABEL_MAX: usize = 63;

/// Enum for supported configuration parameters.
#[derive(Debug, Clone, Copy)]
pub enum Config {
    /// Namespace migration requests are created in.
    Namespace,
    /// Name prefix for generated migration requests.
    RequestPrefix,
}

impl Config {
    /// Returns the associated environment variable for the config parameter.
    pub fn env_var(&self) -> &'static str {
        match self {
            Config::Namespace => "VMRESCUER_NAMESPACE",
            Config::RequestPrefix => "VMRESCUER_REQUEST_PREFIX",
        }
    }

    /// Returns the built-in default for the config parameter.
    pub fn default_value(&self) -> &'static str {
        match self {
            Config::Namespace => "default",
            Config::RequestPrefix => "migrate",
        }
    }

    /// Resolves the parameter from the environment, falling back to the
    /// default when the variable is unset, empty, or not a valid DNS-1123
    /// label (both parameters end up in object names).
    pub fn value(&self) -> String {
        match env::var(self.env_var()) {
            Ok(raw) => {
                let candidate = raw.trim();
                if is_dns_label(candidate) {
                    candidate.to_string()
                } else {
                    self.default_value().to_string()
                }
            }
            Err(_) => self.default_value().to_string(),
        }
    }
}

fn is_dns_label(value: &str) -> bool {
    if value.is_empty() || value.len() > DNS_LABEL_MAX {
        return false;
    }
    let bytes = value.as_bytes();
    let boundary_ok =
        |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    if !boundary_ok(bytes[0]) || !boundary_ok(bytes[bytes.len() - 1]) {
        return false;
    }
    bytes
        .iter()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
}
