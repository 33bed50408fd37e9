// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Thread-safe progress reporting with ETA (§4.9). A thin wrapper around
//! `indicatif`, mirroring the `ProgressBar`/`ProgressStyle` template idiom
//! used elsewhere in this crate's ancestry.

use std::sync::Mutex;

use indicatif::{ProgressBar, ProgressStyle};

/// Serialises updates to a single progress bar behind a mutex, so many
/// worker threads can report completion without corrupting the display
/// (§5 "Suspension/blocking": progress-bar mutex).
pub struct ProgressReporter {
    bar: Mutex<ProgressBar>,
}

impl ProgressReporter {
    pub fn new(len: u64, message: &'static str) -> Self {
        let bar = ProgressBar::new(len).with_style(
            ProgressStyle::default_bar()
                .template("{msg:17}: [{wide_bar:.blue}] {pos:3}/{len:3} ({elapsed_precise}<{eta_precise})")
                .unwrap()
                .progress_chars("=> "),
        ).with_message(message);
        bar.tick();
        Self { bar: Mutex::new(bar) }
    }

    /// Hidden reporter used when progress bars are disabled (e.g.
    /// non-interactive runs).
    pub fn hidden(len: u64) -> Self {
        let bar = ProgressBar::hidden();
        bar.set_length(len);
        Self { bar: Mutex::new(bar) }
    }

    pub fn inc(&self, delta: u64) {
        self.bar.lock().unwrap().inc(delta);
    }

    pub fn finish(&self) {
        self.bar.lock().unwrap().finish();
    }
}
