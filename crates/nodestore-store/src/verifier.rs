// Copyright 2026 The Nodestore Authors. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Backend content verification: walks every stored node and confirms
//! its digest matches its key.

use std::sync::Arc;

use nodestore_error::Error;
use nodestore_util::Hash256;

use crate::backend::Backend;

/// Caps how many corrupt/mismatched hashes are retained for reporting;
/// verification of a backend with more failures than this still counts
/// them all, it just stops collecting samples past the cap.
pub const DEFAULT_SAMPLE_LIMIT: usize = 100;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationResult {
    pub total: u64,
    pub corrupt: u64,
    pub missing: u64,
    pub mismatches: u64,
    pub sample_hashes: Vec<Hash256>,
}

impl VerificationResult {
    pub fn is_clean(&self) -> bool {
        self.corrupt == 0 && self.missing == 0 && self.mismatches == 0
    }
}

/// Walks a backend via `for_each`, checking that every node's declared
/// `data` both is non-empty and digests to its own `hash`. A failing
/// node is classified as a `mismatch` (hash/content disagreement); a
/// node whose data is empty is classified as `missing`.
pub struct Verifier {
    backend: Arc<dyn Backend>,
    sample_limit: usize,
    stop_on_first_error: bool,
}

impl Verifier {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            sample_limit: DEFAULT_SAMPLE_LIMIT,
            stop_on_first_error: false,
        }
    }

    pub fn with_sample_limit(mut self, limit: usize) -> Self {
        self.sample_limit = limit;
        self
    }

    pub fn stop_on_first_error(mut self, stop: bool) -> Self {
        self.stop_on_first_error = stop;
        self
    }

    /// Runs verification, invoking `progress` after every node visited
    /// with the running result so far. Pass a no-op closure if progress
    /// reporting isn't needed.
    pub async fn run(&self, mut progress: impl FnMut(&VerificationResult) + Send) -> Result<VerificationResult, Error> {
        let mut result = VerificationResult::default();
        let stop_on_first_error = self.stop_on_first_error;
        let sample_limit = self.sample_limit;

        struct StopEarly;

        let outcome = self
            .backend
            .for_each(&mut |node| {
                result.total += 1;
                let mut failed = false;

                if node.data.is_empty() {
                    result.missing += 1;
                    failed = true;
                } else {
                    let expected = Hash256::digest(&node.data);
                    if expected != node.hash {
                        result.mismatches += 1;
                        failed = true;
                    }
                }

                if failed && result.sample_hashes.len() < sample_limit {
                    result.sample_hashes.push(node.hash);
                }

                progress(&result);

                if failed && stop_on_first_error {
                    return Err(nodestore_error::make_err!(
                        nodestore_error::Code::Internal,
                        "verification stopped after first error"
                    ));
                }
                Ok(())
            })
            .await;

        match outcome {
            Ok(()) => Ok(result),
            Err(e) if stop_on_first_error && e.code == nodestore_error::Code::Internal => Ok(result),
            Err(e) => Err(e),
        }
    }
}
