// src/audio_buffer.rs

/// Planar view over a block of samples: `[ch0 frames..., ch1 frames..., ...]`.
#[derive(Debug)]
pub struct AudioBuffer<'a> {
    pub channels: usize,
    pub frames: usize,
    pub data: &'a mut [f32],
}

impl<'a> AudioBuffer<'a> {
    /// Wrap existing planar data.
    #[inline]
    pub fn new(data: &'a mut [f32], channels: usize) -> Self {
        let frames = if channels == 0 { 0 } else { data.len() / channels };
        Self {
            channels,
            frames,
            data,
        }
    }

    #[inline]
    pub fn clear(&mut self) {
        self.data.fill(0.0);
    }

    #[inline]
    pub fn channel(&self, ch: usize) -> &[f32] {
        let start = ch * self.frames;
        &self.data[start..start + self.frames]
    }

    #[inline]
    pub fn channel_mut(&mut self, ch: usize) -> &mut [f32] {
        let start = ch * self.frames;
        &mut self.data[start..start + self.frames]
    }

    /// Both channels of a stereo buffer at once.
    #[inline]
    pub fn stereo_mut(&mut self) -> (&mut [f32], &mut [f32]) {
        let frames = self.frames;
        let (left, rest) = self.data.split_at_mut(frames);
        (left, &mut rest[..frames])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_planar_layout() {
        let mut data = vec![1.0, 2.0, 3.0, -4.0, -5.0, -6.0];
        let mut buf = AudioBuffer::new(&mut data, 2);
        assert_eq!(buf.frames, 3);
        assert_eq!(buf.channel(1), &[-4.0, -5.0, -6.0]);

        let (left, right) = buf.stereo_mut();
        left[0] = 0.5;
        right[2] = 0.25;
        assert_eq!(data, vec![0.5, 2.0, 3.0, -4.0, -5.0, 0.25]);
    }
}
