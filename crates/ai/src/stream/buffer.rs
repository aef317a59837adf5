use std::collections::VecDeque;

use mia_core::DataPoint;

/// Bounded FIFO of recent points. Past capacity the oldest point is dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamBuffer {
    points: VecDeque<DataPoint>,
    capacity: usize,
}

impl StreamBuffer {
    /// A zero capacity is bumped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Append a point; returns the evicted point, if any.
    pub fn push(&mut self, point: DataPoint) -> Option<DataPoint> {
        let evicted = if self.points.len() >= self.capacity {
            self.points.pop_front()
        } else {
            None
        };
        self.points.push_back(point);
        evicted
    }

    pub fn last(&self) -> Option<&DataPoint> {
        self.points.back()
    }

    /// Values of the newest `n` points, oldest first.
    pub fn recent_values(&self, n: usize) -> Vec<f64> {
        let skip = self.points.len().saturating_sub(n);
        self.points.iter().skip(skip).map(|p| p.value).collect()
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_oldest_past_capacity() {
        let mut buf = StreamBuffer::new(3);
        for v in 1..=3 {
            assert!(buf.push(DataPoint::now(v as f64)).is_none());
        }
        let evicted = buf.push(DataPoint::now(4.0)).unwrap();
        assert_eq!(evicted.value, 1.0);
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.recent_values(10), vec![2.0, 3.0, 4.0]);
        assert_eq!(buf.recent_values(2), vec![3.0, 4.0]);
        assert_eq!(buf.last().map(|p| p.value), Some(4.0));
    }

    #[test]
    fn zero_capacity_keeps_one_point() {
        let mut buf = StreamBuffer::new(0);
        buf.push(DataPoint::now(1.0));
        buf.push(DataPoint::now(2.0));
        assert_eq!(buf.capacity(), 1);
        assert_eq!(buf.recent_values(5), vec![2.0]);
    }
}
