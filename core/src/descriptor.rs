/// A fixed-length floating point feature vector, compared by Euclidean distance.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    pub data: Vec<f32>,
}

impl Descriptor {
    pub fn new(data: Vec<f32>) -> Self {
        Self { data }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn l2_distance_squared(&self, other: &Descriptor) -> f32 {
        self.data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| {
                let d = a - b;
                d * d
            })
            .sum()
    }

    pub fn l2_distance(&self, other: &Descriptor) -> f32 {
        self.l2_distance_squared(other).sqrt()
    }
}

/// Descriptors stored parallel to the keypoints they were computed for.
#[derive(Debug, Clone, Default)]
pub struct Descriptors {
    pub descriptors: Vec<Descriptor>,
}

impl Descriptors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            descriptors: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, desc: Descriptor) {
        self.descriptors.push(desc);
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Descriptor> {
        self.descriptors.iter()
    }

    pub fn get(&self, idx: usize) -> Option<&Descriptor> {
        self.descriptors.get(idx)
    }
}

impl FromIterator<Descriptor> for Descriptors {
    fn from_iter<I: IntoIterator<Item = Descriptor>>(iter: I) -> Self {
        Self {
            descriptors: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_l2_identical_is_zero() {
        let d = Descriptor::new(vec![1.0, 2.0, 3.0]);
        assert_eq!(d.l2_distance(&d), 0.0);
    }

    #[test]
    fn descriptor_l2_known_value() {
        let a = Descriptor::new(vec![0.0, 0.0]);
        let b = Descriptor::new(vec![3.0, 4.0]);
        assert_eq!(a.l2_distance_squared(&b), 25.0);
        assert_eq!(a.l2_distance(&b), 5.0);
    }

    #[test]
    fn descriptor_size() {
        let d = Descriptor::new(vec![0.0; 128]);
        assert_eq!(d.size(), 128);
    }

    #[test]
    fn descriptors_push_and_get() {
        let mut ds = Descriptors::new();
        assert!(ds.is_empty());
        ds.push(Descriptor::new(vec![1.0; 4]));
        ds.push(Descriptor::new(vec![2.0; 4]));
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.get(1).map(|d| d.data[0]), Some(2.0));
        assert!(ds.get(2).is_none());
    }
}
