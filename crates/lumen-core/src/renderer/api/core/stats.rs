// Copyright 2025 eraflo
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

//! Per-frame counters exposed to diagnostics.

/// A snapshot of the counters of the frame currently being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStatistics {
    /// A sequential counter, incremented by `reset_frame_statistics`.
    pub frame_index: u64,
    /// The number of draws issued this frame.
    pub draw_calls: u32,
    /// The number of textures bound this frame.
    pub texture_binds: u32,
    /// The number of vertex buffers bound this frame.
    pub vertex_buffer_binds: u32,
}

impl FrameStatistics {
    /// Zeroes the counters and advances the frame index.
    pub fn begin_frame(&mut self) {
        *self = Self {
            frame_index: self.frame_index + 1,
            ..Self::default()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_frame_resets_counters() {
        let mut stats = FrameStatistics {
            frame_index: 4,
            draw_calls: 10,
            texture_binds: 3,
            vertex_buffer_binds: 10,
        };
        stats.begin_frame();
        assert_eq!(
            stats,
            FrameStatistics {
                frame_index: 5,
                ..FrameStatistics::default()
            }
        );
    }
}
