// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Wire names for generated calls.
//!
//! With names preserved, functions travel as `<service>/<function>`, methods as their bare name
//! and constructors as the interface name. Otherwise every call is sent as a short token derived
//! from its fully qualified name, which both sides compute identically from the definition.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

/// Digest bytes kept per token; encodes to 8 base64url characters.
pub const TOKEN_BYTES: usize = 6;

pub fn qualified_function(service: &str, function: &str) -> String {
    format!("{service}/{function}")
}

pub fn qualified_method(service: &str, interface: &str, method: &str) -> String {
    format!("{service}/{interface}.{method}")
}

pub fn qualified_constructor(service: &str, interface: &str) -> String {
    format!("{service}/new {interface}")
}

pub fn obfuscate(qualified: &str) -> String {
    let digest = Sha256::digest(qualified.as_bytes());
    URL_SAFE_NO_PAD.encode(&digest[..TOKEN_BYTES])
}
