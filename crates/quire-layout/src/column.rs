//! Columns inside section frames.

use smallvec::{SmallVec, smallvec};

use crate::geom::{Abs, Rect};
use crate::layout::Layout;
use crate::lock::Lock;
use crate::tree::{Node, NodeId, NodeKind, Validity};

/// How the flow frames of a section are spread over its columns.
#[derive(Debug, Clone, Eq, PartialEq)]
struct Distribution {
    /// How many consecutive frames each column takes.
    counts: SmallVec<[usize; 4]>,
    /// The filled height of each column.
    used: SmallVec<[Abs; 4]>,
    /// Whether every column stayed within the limit.
    fits: bool,
}

/// Fills columns greedily in order. A column takes frames while they fit
/// under `limit` and the column's own capacity. A frame that fits nowhere
/// stays in the column where it starts, and the last column takes whatever
/// is left.
fn distribute(heights: &[Abs], caps: &[Abs], limit: Abs) -> Distribution {
    let n = caps.len();
    let mut counts: SmallVec<[usize; 4]> = smallvec![0; n];
    let mut used: SmallVec<[Abs; 4]> = smallvec![Abs::zero(); n];
    let mut fits = true;
    let mut col = 0;
    for &h in heights {
        loop {
            let room = limit.min(caps[col]);
            if used[col] + h <= room {
                break;
            }
            if col + 1 < n && counts[col] > 0 {
                col += 1;
                continue;
            }
            fits = false;
            break;
        }
        counts[col] += 1;
        used[col] += h;
    }
    Distribution { counts, used, fits }
}

/// The smallest common column height under which all frames fit.
fn balanced_height(heights: &[Abs], caps: &[Abs]) -> Abs {
    let cap = caps.iter().copied().max().unwrap_or_default();
    if heights.is_empty() || caps.is_empty() {
        return Abs::zero();
    }
    if !distribute(heights, caps, cap).fits {
        return cap;
    }
    let total: Abs = heights.iter().sum();
    let tallest = heights.iter().copied().max().unwrap_or_default();
    let mut lo = tallest.max(total / caps.len() as i64).min(cap).to_raw();
    let mut hi = cap.to_raw();
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if distribute(heights, caps, Abs::raw(mid)).fits {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }
    Abs::raw(lo)
}

impl Layout {
    /// Rebuilds the column sub-tree of a section frame to match its
    /// descriptor. Content survives the rebuild.
    pub(crate) fn chg_columns(&mut self, id: NodeId) {
        let wanted = if self.arena.in_footnote(id) {
            0
        } else {
            let count = self.descriptor(id).map_or(1, |desc| desc.column_count());
            let notes = self.section_flags(id).is_some_and(|data| data.any_note_at_end());
            if count > 1 {
                count
            } else if notes {
                1
            } else {
                0
            }
        };
        let current = self.arena.columns(id);
        if current.len() == wanted {
            return;
        }
        let saved = self.save_content(id, None);
        for col in current {
            self.free_frame(col);
        }
        for _ in 0..wanted {
            let col = self.arena.alloc(Node::new(NodeKind::Column));
            self.arena.link(col, id, None);
            let body = self.arena.alloc(Node::new(NodeKind::Body));
            self.arena.link(body, col, None);
        }
        let leaf = self.arena.first_leaf(id);
        self.restore_content(saved, leaf, None);
        self.invalidate(id, Validity::PRT | Validity::SIZE);
        if wanted > 0 {
            self.adjust_columns(id);
        }
        tracing::debug!(?id, columns = wanted, "rebuilt columns");
    }

    /// Lays the columns side by side over the print area.
    pub(crate) fn adjust_columns(&mut self, id: NodeId) {
        let height = self.arena[id].prt.height;
        self.adjust_columns_to(id, height);
    }

    fn adjust_columns_to(&mut self, id: NodeId, height: Abs) {
        let columns: SmallVec<[NodeId; 4]> = self.arena.columns(id).into();
        if columns.is_empty() {
            return;
        }
        let area = self.arena[id].prt_abs();
        let gutter = self.descriptor(id).map(|desc| desc.gutter).unwrap_or_default();
        let n = columns.len() as i64;
        let width = ((area.width - gutter * (n - 1)).max(Abs::zero())) / n;
        for (i, &col) in columns.iter().enumerate() {
            let x = area.x + (width + gutter) * i as i64;
            let w = if i + 1 == columns.len() {
                (area.right() - x).max(Abs::zero())
            } else {
                width
            };
            self.place_part(col, Rect::new(x, area.y, w, height));
            let cont = self.arena.footnote_container(col);
            let notes = cont.map(|c| self.container_height(c).min(height)).unwrap_or_default();
            if let Some(body) = self.arena.column_body(col) {
                self.place_part(body, Rect::new(x, area.y, w, height - notes));
            }
            if let Some(cont) = cont {
                self.place_part(cont, Rect::new(x, area.y + height - notes, w, notes));
                self.format_container(cont);
            }
        }
    }

    /// The height a flow frame takes in a column.
    fn flow_height(&self, id: NodeId) -> Abs {
        match self.arena.kind(id) {
            NodeKind::Content(_) => self.content_height(id),
            _ => self.arena[id].frame.height,
        }
    }

    /// Spreads the flow frames over the columns and formats them. Returns
    /// the resulting column height.
    ///
    /// A balanced section that does not fill its space gets the smallest
    /// common height under which everything fits. Otherwise the columns are
    /// filled one after the other up to the available height.
    pub(crate) fn format_width_cols(&mut self, id: NodeId, maximize: bool) -> Abs {
        let columns: SmallVec<[NodeId; 4]> = self.arena.columns(id).into();
        if columns.is_empty() {
            return Abs::zero();
        }
        let top = self.arena[id].prt_abs().y;
        let space = if maximize {
            self.arena[id].prt.height
        } else {
            (self.deadline(id) - top).max(Abs::zero())
        };
        let caps: SmallVec<[Abs; 4]> = columns
            .iter()
            .map(|&c| {
                let notes = self.arena.footnote_container(c).map(|f| self.container_height(f));
                (space - notes.unwrap_or_default()).max(Abs::zero())
            })
            .collect();
        let bodies: SmallVec<[NodeId; 4]> =
            columns.iter().filter_map(|&c| self.arena.column_body(c)).collect();
        let frames: Vec<NodeId> =
            bodies.iter().flat_map(|&b| self.arena.children(b)).collect();
        let heights: Vec<Abs> = frames.iter().map(|&f| self.flow_height(f)).collect();

        let balance = !maximize && self.descriptor(id).is_some_and(|desc| desc.balance);
        let limit = if balance {
            balanced_height(&heights, &caps)
        } else {
            caps.iter().copied().max().unwrap_or_default()
        };
        let dist = distribute(&heights, &caps, limit);

        let mut frames = frames.into_iter();
        for (&body, &count) in bodies.iter().zip(&dist.counts) {
            for frame in frames.by_ref().take(count) {
                let moved = self.arena[frame].upper != Some(body);
                self.arena.unlink(frame);
                self.arena.link(frame, body, None);
                if moved {
                    self.invalidate(frame, Validity::POS);
                }
            }
        }

        let height = if maximize {
            space
        } else {
            columns
                .iter()
                .zip(&dist.used)
                .map(|(&c, &used)| {
                    let cont = self.arena.footnote_container(c);
                    used + cont.map(|f| self.container_height(f)).unwrap_or_default()
                })
                .max()
                .unwrap_or_default()
        };
        self.adjust_columns_to(id, height);
        for body in bodies {
            self.format_lowers(body);
        }
        tracing::trace!(?id, ?height, balance, "formatted columns");
        height
    }

    /// Recomputes the column geometry of a section frame and, if asked, of
    /// its follows.
    pub(crate) fn column_refresh(&mut self, id: NodeId, follows: bool) {
        let mut current = Some(id);
        while let Some(sect) = current {
            let mut this = Lock::col(self, sect);
            if this.arena.has_columns(sect) {
                this.adjust_columns(sect);
                for col in this.arena.columns(sect) {
                    this.invalidate(col, Validity::SIZE);
                    let first = this.arena.column_body(col).and_then(|b| this.arena[b].first);
                    if let Some(first) = first {
                        this.invalidate(first, Validity::POS);
                    }
                }
            }
            current = if follows { this.follow_of(sect) } else { None };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pts(values: &[f64]) -> Vec<Abs> {
        values.iter().map(|&v| Abs::pt(v)).collect()
    }

    #[test]
    fn test_distribute_fills_in_order() {
        let dist = distribute(&pts(&[10.0, 10.0, 10.0]), &pts(&[25.0, 25.0]), Abs::pt(25.0));
        assert_eq!(dist.counts.as_slice(), &[2, 1]);
        assert!(dist.fits);
    }

    #[test]
    fn test_distribute_last_column_takes_rest() {
        let dist = distribute(&pts(&[10.0, 10.0, 10.0, 10.0]), &pts(&[15.0, 15.0]), Abs::pt(15.0));
        assert_eq!(dist.counts.as_slice(), &[1, 3]);
        assert!(!dist.fits);
    }

    #[test]
    fn test_distribute_keeps_tall_frame_atomic() {
        let dist = distribute(&pts(&[40.0, 5.0]), &pts(&[20.0, 20.0]), Abs::pt(20.0));
        assert_eq!(dist.counts.as_slice(), &[1, 1]);
        assert!(!dist.fits);
    }

    #[test]
    fn test_balanced_height_is_minimal() {
        let heights = pts(&[10.0, 10.0, 10.0, 10.0]);
        let caps = pts(&[100.0, 100.0]);
        assert_eq!(balanced_height(&heights, &caps), Abs::pt(20.0));
        let uneven = pts(&[30.0, 10.0, 10.0]);
        assert_eq!(balanced_height(&uneven, &caps), Abs::pt(30.0));
    }

    #[test]
    fn test_balanced_height_falls_back_to_capacity() {
        let heights = pts(&[50.0, 50.0, 50.0]);
        let caps = pts(&[60.0, 60.0]);
        assert_eq!(balanced_height(&heights, &caps), Abs::pt(60.0));
        assert_eq!(balanced_height(&[], &caps), Abs::zero());
    }
}
