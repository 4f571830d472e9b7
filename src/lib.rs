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

//! A software library of stochastic streaming algorithms (a.k.a. sketches).
//!
//! Currently implements the CPC (Compressed Probabilistic Counting)
//! cardinality-estimation sketch; see [`cpc`].

pub(crate) mod codec;
pub mod common;
pub mod cpc;
pub mod error;
pub(crate) mod hash;
