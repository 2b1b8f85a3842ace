/// Progress of a single block of a piece being downloaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockState {
    /// Nobody was asked for the block yet
    #[default]
    None,
    /// Block was requested from a peer
    Requested,
    /// Block payload arrived and is being written to disk
    Writing,
    /// Block is on disk
    Finished,
}

/// Per-block state of a piece that was started but is not complete yet.
///
/// Aggregates are computed by scanning the block states, so they can never disagree with them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadingPiece {
    index: usize,
    blocks: Vec<BlockState>,
}

impl DownloadingPiece {
    pub fn new(index: usize, blocks_count: usize) -> Self {
        assert!(blocks_count > 0, "piece {} must have blocks", index);
        Self {
            index,
            blocks: vec![BlockState::None; blocks_count],
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn blocks_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn state(&self, block: usize) -> BlockState {
        self.blocks[block]
    }

    pub fn request_block(&mut self, block: usize) {
        self.set(block, BlockState::Requested);
    }

    pub fn write_block(&mut self, block: usize) {
        self.set(block, BlockState::Writing);
    }

    pub fn finish_block(&mut self, block: usize) {
        self.set(block, BlockState::Finished);
    }

    pub fn abort_downloading(&mut self, block: usize) {
        self.set(block, BlockState::None);
    }

    /// The block payload is no longer needed from the network
    pub fn is_downloaded(&self, block: usize) -> bool {
        matches!(
            self.blocks[block],
            BlockState::Writing | BlockState::Finished
        )
    }

    pub fn is_finished(&self, block: usize) -> bool {
        self.blocks[block] == BlockState::Finished
    }

    pub fn finished_count(&self) -> usize {
        self.count(BlockState::Finished)
    }

    pub fn downloading_count(&self) -> usize {
        self.count(BlockState::Requested)
    }

    pub fn writing_count(&self) -> usize {
        self.count(BlockState::Writing)
    }

    /// Blocks that are either being written or already on disk
    pub fn downloaded_count(&self) -> usize {
        self.finished_count() + self.writing_count()
    }

    pub fn is_complete(&self) -> bool {
        self.blocks.iter().all(|state| *state == BlockState::Finished)
    }

    pub fn is_untouched(&self) -> bool {
        self.blocks.iter().all(|state| *state == BlockState::None)
    }

    pub fn free_blocks(&self) -> impl Iterator<Item = usize> + '_ {
        self.blocks
            .iter()
            .enumerate()
            .filter(|(_, state)| **state == BlockState::None)
            .map(|(block, _)| block)
    }

    fn set(&mut self, block: usize, state: BlockState) {
        assert!(
            block < self.blocks.len(),
            "invalid block {} for piece {} with {} blocks",
            block,
            self.index,
            self.blocks.len()
        );
        self.blocks[block] = state;
    }

    fn count(&self, state: BlockState) -> usize {
        self.blocks.iter().filter(|other| **other == state).count()
    }
}
