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

//! Compressed Probabilistic Counting: a compact, mergeable cardinality
//! estimator. See [`CpcSketch`] for single-stream updates, [`CpcUnion`] for
//! merging multiple sketches, and [`CpcWrapper`] for a read-only, allocation-light
//! view over a serialized sketch.

mod bit_matrix;
mod compression;
mod cpc_confidence;
mod estimator;
mod flavor;
mod icon_estimator;
mod pair_table;
mod serialization;
mod sketch;
mod union;

pub use serialization::CpcWrapper;
pub use sketch::CpcSketch;
pub use union::CpcUnion;
