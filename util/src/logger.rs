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

//! Console logging setup shared by the obol binaries and tests.

use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

/// Initialise a console logger at the given level. Later calls are
/// no-ops, so tests can call this freely.
pub fn init(level: LevelFilter) {
	let stdout = ConsoleAppender::builder()
		.encoder(Box::new(PatternEncoder::new(
			"{d(%Y%m%d %H:%M:%S%.3f)} {h({l})} {M} - {m}{n}",
		)))
		.build();
	let config = match Config::builder()
		.appender(Appender::builder().build("stdout", Box::new(stdout)))
		.build(Root::builder().appender("stdout").build(level))
	{
		Ok(config) => config,
		Err(_) => return,
	};
	let _ = log4rs::init_config(config);
}
