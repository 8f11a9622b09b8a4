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

use std::error::Error;
use std::fmt;

#[derive(Debug)]
enum Wrapped {
    Context {
        context: String,
        source: Box<dyn Error + Send + Sync>,
    },
    Message(String),
}

impl fmt::Display for Wrapped {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Wrapped::Context { context, source } => write!(f, "{}: {}", context, source),
            Wrapped::Message(message) => f.write_str(message),
        }
    }
}

impl Error for Wrapped {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Wrapped::Context { source, .. } => Some(source.as_ref()),
            Wrapped::Message(_) => None,
        }
    }
}

/// Wraps `error` with a caller-supplied context line while preserving the
/// source chain.
pub fn with_context<E>(error: E, context: impl Into<String>) -> Box<dyn Error + Send + Sync>
where
    E: Into<Box<dyn Error + Send + Sync>>,
{
    Box::new(Wrapped::Context {
        context: context.into(),
        source: error.into(),
    })
}

/// Builds a standalone boxed error from a message.
pub fn new_error(message: impl Into<String>) -> Box<dyn Error + Send + Sync> {
    Box::new(Wrapped::Message(message.into()))
}
