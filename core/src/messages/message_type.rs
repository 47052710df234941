// Copyright 2021 The Obol Developers
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

//! Leading message-type byte shared by every embedded message family.

/// Prefix a fresh payload with its message-type byte.
pub fn pack(message_type_id: u32) -> Vec<u8> {
	vec![message_type_id as u8]
}

/// Split the message-type byte off an embedded payload. `None` when the
/// payload is empty.
pub fn unpack(data: &[u8]) -> Option<(u32, &[u8])> {
	data.split_first()
		.map(|(id, message)| (u32::from(*id), message))
}
