/// 入力を固定長ブロックに切り出す（余りは次回に持ち越し）
#[derive(Debug)]
pub struct VadChunker {
    chunk_samples: usize,
    buffer: Vec<f32>,
}

impl VadChunker {
    pub fn new(chunk_samples: usize) -> Self {
        let chunk_samples = chunk_samples.max(1);
        Self {
            chunk_samples,
            buffer: Vec::with_capacity(chunk_samples * 2),
        }
    }

    pub fn push(&mut self, samples: &[f32]) -> Vec<Vec<f32>> {
        self.buffer.extend_from_slice(samples);
        let mut chunks = Vec::new();

        while self.buffer.len() >= self.chunk_samples {
            let remainder = self.buffer.split_off(self.chunk_samples);
            chunks.push(std::mem::replace(&mut self.buffer, remainder));
        }

        chunks
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
