// Uniform bucket grid over simplex bounding boxes in the xy plane.

/// Maps an xy location to the simplices whose bounding boxes cover it.
#[derive(Debug, Clone)]
pub struct BucketIndex {
    origin: [f64; 2],
    cell: [f64; 2],
    dims: [usize; 2],
    buckets: Vec<Vec<u32>>,
}

const MAX_SIDE: usize = 1024;
/// Box growth so that points on shared edges land in every touching bucket.
const SLACK: f64 = 1e-9;

impl BucketIndex {
    pub fn new(boxes: &[([f64; 2], [f64; 2])]) -> Self {
        let mut lo = [f64::INFINITY; 2];
        let mut hi = [f64::NEG_INFINITY; 2];
        for (bmin, bmax) in boxes {
            for a in 0..2 {
                lo[a] = lo[a].min(bmin[a] - SLACK);
                hi[a] = hi[a].max(bmax[a] + SLACK);
            }
        }
        if boxes.is_empty() {
            lo = [0.0; 2];
            hi = [1.0; 2];
        }

        let side = ((boxes.len() as f64).sqrt().ceil() as usize).clamp(1, MAX_SIDE);
        let dims = [side, side];
        let cell = [(hi[0] - lo[0]) / side as f64, (hi[1] - lo[1]) / side as f64];
        let mut index = Self {
            origin: lo,
            cell,
            dims,
            buckets: vec![Vec::new(); side * side],
        };

        for (id, (bmin, bmax)) in boxes.iter().enumerate() {
            let [i0, j0] = index.cell_of([bmin[0] - SLACK, bmin[1] - SLACK]);
            let [i1, j1] = index.cell_of([bmax[0] + SLACK, bmax[1] + SLACK]);
            for j in j0..=j1 {
                for i in i0..=i1 {
                    index.buckets[j * side + i].push(id as u32);
                }
            }
        }
        index
    }

    fn cell_of(&self, p: [f64; 2]) -> [usize; 2] {
        std::array::from_fn(|a| {
            let t = ((p[a] - self.origin[a]) / self.cell[a]).floor();
            if t.is_nan() || t < 0.0 {
                0
            } else {
                (t as usize).min(self.dims[a] - 1)
            }
        })
    }

    /// Candidate simplex ids for `p`, in insertion order.
    pub fn candidates(&self, p: [f64; 2]) -> &[u32] {
        let inside = (0..2).all(|a| {
            p[a] >= self.origin[a] && p[a] <= self.origin[a] + self.cell[a] * self.dims[a] as f64
        });
        if !inside {
            return &[];
        }
        let [i, j] = self.cell_of(p);
        &self.buckets[j * self.dims[0] + i]
    }
}
