// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Map-like storage for keys that cluster in a small, moving window.
//!
//! This is an unbounded circular buffer keyed by an integer-like key: the
//! live keys always lie in `[min_key, max_key]` and are stored at ring index
//! `(min_key_index + (key - min_key)) % capacity`. The ring grows (never
//! shrinks) when a key outside of the current capacity is requested.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt::Display;
use std::hash::Hash;
use std::marker::PhantomData;

use anyhow::Result;
use bv::BitVec;
use num_traits::{NumCast, PrimInt, Zero};

use crate::errors;

/// Initial capacity and growth slack of the ring.
pub const MIN_CHUNK: usize = 1024;

/// How a slot is reset before it is handed out for a newly created key.
pub trait ClearPolicy<V> {
    fn clear(value: &mut V);
}

/// Reset numeric values to zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroClear;

impl<V: Zero> ClearPolicy<V> for ZeroClear {
    fn clear(value: &mut V) {
        *value = V::zero();
    }
}

/// Reset containers to empty, keeping their allocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyClear;

impl<V: Clear> ClearPolicy<V> for EmptyClear {
    fn clear(value: &mut V) {
        value.clear();
    }
}

/// Containers that can be emptied in place.
pub trait Clear {
    fn clear(&mut self);
}

impl<T> Clear for Vec<T> {
    fn clear(&mut self) {
        Vec::clear(self)
    }
}

impl<T> Clear for VecDeque<T> {
    fn clear(&mut self) {
        VecDeque::clear(self)
    }
}

impl Clear for String {
    fn clear(&mut self) {
        String::clear(self)
    }
}

impl<K: Ord, V> Clear for BTreeMap<K, V> {
    fn clear(&mut self) {
        BTreeMap::clear(self)
    }
}

impl<K: Eq + Hash, V> Clear for HashMap<K, V> {
    fn clear(&mut self) {
        HashMap::clear(self)
    }
}

#[derive(Debug, Clone)]
pub struct SlidingPositionMap<K, V, C = ZeroClear> {
    is_empty: bool,
    min_key_index: usize,
    min_key: K,
    max_key: K,
    len: usize,
    data: Vec<V>,
    occupied: BitVec,
    clear_policy: PhantomData<C>,
}

impl<K, V, C> Default for SlidingPositionMap<K, V, C>
where
    K: PrimInt + Display,
    V: Default,
    C: ClearPolicy<V>,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, C> SlidingPositionMap<K, V, C>
where
    K: PrimInt + Display,
    V: Default,
    C: ClearPolicy<V>,
{
    pub fn new() -> Self {
        let mut data = Vec::with_capacity(MIN_CHUNK);
        data.resize_with(MIN_CHUNK, V::default);
        SlidingPositionMap {
            is_empty: true,
            min_key_index: 0,
            min_key: K::zero(),
            max_key: K::zero(),
            len: 0,
            data,
            occupied: BitVec::new_fill(false, MIN_CHUNK as u64),
            clear_policy: PhantomData,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.is_empty
    }

    /// Number of occupied keys.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Number of physical slots in the ring.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn min_key(&self) -> Option<K> {
        if self.is_empty {
            None
        } else {
            Some(self.min_key)
        }
    }

    pub fn max_key(&self) -> Option<K> {
        if self.is_empty {
            None
        } else {
            Some(self.max_key)
        }
    }

    pub fn contains(&self, key: K) -> bool {
        !(self.is_empty
            || key < self.min_key
            || key > self.max_key
            || !self.occupied.get(self.key_index(key) as u64))
    }

    /// Mutable reference to the value of `key`, creating it if necessary.
    ///
    /// A newly created slot is reset with the clear policy first, so it never
    /// carries data of a previous occupant.
    pub fn get_or_create(&mut self, key: K) -> &mut V {
        if self.is_empty {
            self.min_key = key;
        } else if key < self.min_key {
            self.expand(offset(key, self.max_key) + 1);
            let shift = offset(key, self.min_key);
            let capacity = self.data.len();
            self.min_key_index = (self.min_key_index + capacity - shift) % capacity;
            self.min_key = key;
        }

        if self.is_empty || key > self.max_key {
            self.expand(offset(self.min_key, key) + 1);
            self.max_key = key;
            self.is_empty = false;
        }

        let index = self.key_index(key);
        if !self.occupied.get(index as u64) {
            C::clear(&mut self.data[index]);
            self.occupied.set(index as u64, true);
            self.len += 1;
        }
        &mut self.data[index]
    }

    pub fn get(&self, key: K) -> Result<&V> {
        self.enforce_key_present(key)?;
        Ok(&self.data[self.key_index(key)])
    }

    pub fn get_mut(&mut self, key: K) -> Result<&mut V> {
        self.enforce_key_present(key)?;
        let index = self.key_index(key);
        Ok(&mut self.data[index])
    }

    /// Value of `key`, or `default` if the key is not occupied.
    pub fn get_or_default<'a>(&'a self, key: K, default: &'a V) -> &'a V {
        if self.contains(key) {
            &self.data[self.key_index(key)]
        } else {
            default
        }
    }

    /// Free the slot of `key`.
    ///
    /// Erasing the minimum (maximum) key moves it to the next occupied key
    /// above (below) it. The scan is bounded by the current key span, which
    /// never exceeds the capacity of the ring.
    pub fn erase(&mut self, key: K) -> Result<()> {
        self.enforce_key_present(key)?;
        let index = self.key_index(key);
        self.occupied.set(index as u64, false);
        self.len -= 1;

        if self.len == 0 {
            self.is_empty = true;
            return Ok(());
        }

        let capacity = self.data.len();
        let span = offset(self.min_key, self.max_key);
        if key == self.min_key {
            for step in 1..=span {
                let candidate = (index + step) % capacity;
                if self.occupied.get(candidate as u64) {
                    self.min_key_index = candidate;
                    self.min_key = self.min_key + from_offset::<K>(step);
                    break;
                }
            }
        } else if key == self.max_key {
            for step in 1..=span {
                let candidate = (index + capacity - step) % capacity;
                if self.occupied.get(candidate as u64) {
                    self.max_key = self.max_key - from_offset::<K>(step);
                    break;
                }
            }
        }
        Ok(())
    }

    /// Occupied keys in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = K> + '_ {
        let span = if self.is_empty {
            0
        } else {
            offset(self.min_key, self.max_key) + 1
        };
        let capacity = self.data.len();
        (0..span).filter_map(move |step| {
            if self
                .occupied
                .get(((self.min_key_index + step) % capacity) as u64)
            {
                Some(self.min_key + from_offset::<K>(step))
            } else {
                None
            }
        })
    }

    /// Ring index of a key, assumes the key lies in `[min_key, max_key]`.
    fn key_index(&self, key: K) -> usize {
        (self.min_key_index + offset(self.min_key, key)) % self.data.len()
    }

    /// Rotate the ring so that the minimum key sits at physical index 0.
    fn norm_rotate(&mut self) {
        let capacity = self.data.len();
        self.data.rotate_left(self.min_key_index);
        let mut occupied = BitVec::new_fill(false, capacity as u64);
        for i in 0..capacity {
            let source = (self.min_key_index + i) % capacity;
            occupied.set(i as u64, self.occupied.get(source as u64));
        }
        self.occupied = occupied;
        self.min_key_index = 0;
    }

    /// Grow to the larger of twice the current capacity or the required span
    /// plus `MIN_CHUNK`.
    fn expand(&mut self, required_span: usize) {
        let capacity = self.data.len();
        if required_span <= capacity {
            return;
        }
        let new_capacity = std::cmp::max(2 * capacity, required_span + MIN_CHUNK);
        debug!(
            "Growing position map from {} to {} slots.",
            capacity, new_capacity
        );
        self.norm_rotate();
        self.data.resize_with(new_capacity, V::default);
        self.occupied.resize(new_capacity as u64, false);
    }

    fn enforce_key_present(&self, key: K) -> Result<()> {
        if self.contains(key) {
            Ok(())
        } else {
            Err(errors::invalid_key(key).into())
        }
    }
}

/// Distance from `lower` to `upper`, assumes `lower <= upper`.
fn offset<K: PrimInt>(lower: K, upper: K) -> usize {
    (upper - lower).to_usize().unwrap_or(usize::MAX)
}

fn from_offset<K: PrimInt>(step: usize) -> K {
    <K as NumCast>::from(step).unwrap_or_else(K::max_value)
}
