use std::borrow::Borrow;
use std::cmp::Ord;
use std::fmt;

/// Vector of key/value pairs kept sorted by key.
///
/// Lookups are binary searches. Unlike a map, the first value inserted for
/// a key can be made to win (see [`OrderedVec::insert_if_absent`]), which is
/// what deduplicating a time index needs.
pub struct OrderedVec<K, V>(Vec<(K, V)>);

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for OrderedVec<K, V> {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		let mut dbg = f.debug_map();
		for (ref k, ref v) in self.0.iter() {
			dbg.entry(k, v);
		}
		dbg.finish()
	}
}

impl<K: Clone, V: Clone> Clone for OrderedVec<K, V> {
	fn clone(&self) -> Self {
		OrderedVec(self.0.clone())
	}
}

impl<K: PartialEq, V: PartialEq> PartialEq for OrderedVec<K, V> {
	fn eq(&self, other: &Self) -> bool {
		self.0 == other.0
	}
}

impl<K, V> Default for OrderedVec<K, V> {
	fn default() -> Self {
		Self(Vec::new())
	}
}

impl<K, V> OrderedVec<K, V> {
	pub fn new() -> Self {
		Self(Vec::new())
	}

	pub fn with_capacity(capacity: usize) -> Self {
		Self(Vec::with_capacity(capacity))
	}

	#[inline]
	fn find<Q: ?Sized>(&self, k: &Q) -> Result<usize, usize>
		where
			K: Borrow<Q>,
			Q: Ord
	{
		self.0.binary_search_by(|kv: &(K, V)| { Ord::cmp(kv.0.borrow(), k) })
	}

	/// Insert or replace the value for `k`, returning the previous one.
	pub fn insert(&mut self, k: K, mut v: V) -> Option<V>
		where K: Ord
	{
		match self.find(&k) {
			Ok(existing) => {
				std::mem::swap(&mut v, &mut self.0[existing].1);
				Some(v)
			}
			Err(target) => {
				self.0.insert(target, (k, v));
				None
			},
		}
	}

	/// Insert `v` only if there is no value for `k` yet.
	///
	/// Returns whether the value was inserted.
	pub fn insert_if_absent(&mut self, k: K, v: V) -> bool
		where K: Ord
	{
		match self.find(&k) {
			Ok(_) => false,
			Err(target) => {
				self.0.insert(target, (k, v));
				true
			},
		}
	}

	pub fn get<Q: ?Sized>(&self, k: &Q) -> Option<&V>
		where
			K: Borrow<Q>,
			Q: Ord
	{
		match self.find(k) {
			Ok(existing) => Some(&self.0[existing].1),
			Err(_) => None,
		}
	}

	pub fn contains_key<Q: ?Sized>(&self, k: &Q) -> bool
		where
			K: Borrow<Q>,
			Q: Ord
	{
		self.find(k).is_ok()
	}

	pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
		self.0.iter().map(|kv| &kv.0)
	}

	pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
		self.0.iter().map(|kv| &kv.1)
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

/// Collects pairs; on duplicate keys the first pair seen is kept.
impl<K: Ord, V> FromIterator<(K, V)> for OrderedVec<K, V> {
	fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
		let iter = iter.into_iter();
		let mut result = Self::with_capacity(iter.size_hint().0);
		for (k, v) in iter {
			result.insert_if_absent(k, v);
		}
		result
	}
}

impl<K, V> From<OrderedVec<K, V>> for Vec<(K, V)> {
	fn from(other: OrderedVec<K, V>) -> Self {
		other.0
	}
}

impl<K, V> std::ops::Deref for OrderedVec<K, V> {
	type Target = [(K, V)];

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
