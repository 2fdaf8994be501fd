//! Connected regions of ink.

use crate::item::{PixelGrid, GRID_SIZE, PIXEL_COUNT};

/// One 4-connected region of non-background pixels (any mix of colors).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    /// Pixel count
    pub size: usize,
    /// Row-major index of the first pixel reached by the scan
    pub seed: usize,
}

/// Label 4-connected ink regions with an explicit stack flood fill.
///
/// Components are returned in scan order of their first pixel.
pub fn connected_components(grid: &PixelGrid) -> Vec<Component> {
    let mut visited = [false; PIXEL_COUNT];
    let mut stack = Vec::with_capacity(PIXEL_COUNT);
    let mut components = Vec::new();

    for seed in 0..PIXEL_COUNT {
        if visited[seed] || !grid.is_ink(seed / GRID_SIZE, seed % GRID_SIZE) {
            continue;
        }

        visited[seed] = true;
        stack.push(seed);
        let mut size = 0;

        while let Some(idx) = stack.pop() {
            size += 1;
            let (row, col) = (idx / GRID_SIZE, idx % GRID_SIZE);

            let mut visit = |r: usize, c: usize| {
                let n = r * GRID_SIZE + c;
                if !visited[n] && grid.is_ink(r, c) {
                    visited[n] = true;
                    stack.push(n);
                }
            };

            if row > 0 {
                visit(row - 1, col);
            }
            if row + 1 < GRID_SIZE {
                visit(row + 1, col);
            }
            if col > 0 {
                visit(row, col - 1);
            }
            if col + 1 < GRID_SIZE {
                visit(row, col + 1);
            }
        }

        components.push(Component { size, seed });
    }

    components
}
