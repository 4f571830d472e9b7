// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

/// Number of standard deviations used to select a confidence-interval width.
///
/// Every sketch family's `lower_bound`/`upper_bound` accepts this rather than
/// a raw integer so the supported kappa values (1, 2, 3) are enforced by the
/// type system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumStdDev {
    /// 1 standard deviation, roughly a 68.3% confidence interval.
    One,
    /// 2 standard deviations, roughly a 95.4% confidence interval.
    Two,
    /// 3 standard deviations, roughly a 99.7% confidence interval.
    Three,
}

impl NumStdDev {
    /// Returns the kappa value as used by the confidence-bound formulas: 1, 2, or 3.
    pub fn as_u8(self) -> u8 {
        match self {
            NumStdDev::One => 1,
            NumStdDev::Two => 2,
            NumStdDev::Three => 3,
        }
    }
}
