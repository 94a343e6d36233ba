use serde_json::Value;

/// Shallow-merge capability for values held by a [`Store`](super::StoreApi).
///
/// A `Patch` carries a subset of the top-level fields of `Self`. Merging
/// produces a new value in which every field present in the patch is
/// overwritten and every other field is carried over from `self`. Merging is
/// one level deep only; nested values are never merged.
///
/// Types without fields (numbers, booleans, strings) use `Patch = Self` and
/// take the patch verbatim. Such types also compare by value rather than by
/// pointer identity, which is what [`is_same`](Merge::is_same) and
/// [`patch_is_noop`](Merge::patch_is_noop) report.
///
/// # Examples
///
/// ```
/// use stashbox::Merge;
/// use std::sync::Arc;
///
/// #[derive(Clone)]
/// struct Form {
///     name: String,
///     tags: Arc<Vec<String>>,
/// }
///
/// #[derive(Default)]
/// struct FormPatch {
///     name: Option<String>,
///     tags: Option<Arc<Vec<String>>>,
/// }
///
/// impl Merge for Form {
///     type Patch = FormPatch;
///
///     fn merge(&self, patch: FormPatch) -> Self {
///         Self {
///             name: patch.name.unwrap_or_else(|| self.name.clone()),
///             tags: patch.tags.unwrap_or_else(|| Arc::clone(&self.tags)),
///         }
///     }
/// }
///
/// let form = Form { name: "a".into(), tags: Arc::new(vec![]) };
/// let next = form.merge(FormPatch { name: Some("b".into()), ..Default::default() });
/// assert_eq!(next.name, "b");
/// assert!(Arc::ptr_eq(&next.tags, &form.tags));
/// ```
pub trait Merge: Sized + Send + Sync + 'static {
    /// Partial form of the value.
    type Patch: 'static;

    /// Produce the shallow merge of `self` with `patch`.
    fn merge(&self, patch: Self::Patch) -> Self;

    /// Whether `other` is the same value as `self` for types that have value
    /// identity. Structured types keep the default and rely on pointer
    /// identity alone.
    fn is_same(&self, _other: &Self) -> bool {
        false
    }

    /// Whether applying `patch` is guaranteed to leave the value unchanged.
    fn patch_is_noop(&self, _patch: &Self::Patch) -> bool {
        false
    }

    /// The complete value `patch` stands for when it replaces the state.
    ///
    /// Types whose patch cannot describe a whole value keep the default,
    /// which hands the patch back so it can be merged instead.
    fn from_patch(patch: Self::Patch) -> Result<Self, Self::Patch> {
        Err(patch)
    }

    /// Shallow merge of a complete `value` over `self`, used when a whole
    /// value is applied without replacing. `None` installs `value` as-is.
    fn merge_whole(&self, _value: &Self) -> Option<Self> {
        None
    }
}

macro_rules! impl_verbatim_merge {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Merge for $ty {
                type Patch = $ty;

                fn merge(&self, patch: $ty) -> Self {
                    patch
                }

                fn is_same(&self, other: &Self) -> bool {
                    self == other
                }

                fn patch_is_noop(&self, patch: &$ty) -> bool {
                    self == patch
                }

                fn from_patch(patch: $ty) -> Result<Self, $ty> {
                    Ok(patch)
                }
            }
        )*
    };
}

impl_verbatim_merge!(
    bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, String,
    &'static str,
);

// Floats compare by bit pattern: NaN is the same as NaN, 0.0 differs from -0.0.
macro_rules! impl_float_merge {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Merge for $ty {
                type Patch = $ty;

                fn merge(&self, patch: $ty) -> Self {
                    patch
                }

                fn is_same(&self, other: &Self) -> bool {
                    self.to_bits() == other.to_bits()
                }

                fn patch_is_noop(&self, patch: &$ty) -> bool {
                    self.to_bits() == patch.to_bits()
                }

                fn from_patch(patch: $ty) -> Result<Self, $ty> {
                    Ok(patch)
                }
            }
        )*
    };
}

impl_float_merge!(f32, f64);

/// JSON values merge like plain objects: an object patch applied to an object
/// overwrites the patch's top-level keys and keeps the rest. Every other
/// combination takes the patch verbatim.
impl Merge for Value {
    type Patch = Value;

    fn merge(&self, patch: Value) -> Self {
        match (self, patch) {
            (Value::Object(current), Value::Object(patch)) => {
                let mut merged = current.clone();
                merged.extend(patch);
                Value::Object(merged)
            }
            (_, patch) => patch,
        }
    }

    fn is_same(&self, other: &Self) -> bool {
        is_scalar(self) && self == other
    }

    fn patch_is_noop(&self, patch: &Value) -> bool {
        is_scalar(patch) && self == patch
    }

    fn from_patch(patch: Value) -> Result<Self, Value> {
        Ok(patch)
    }

    fn merge_whole(&self, value: &Value) -> Option<Self> {
        match (self, value) {
            (Value::Object(current), Value::Object(value)) => {
                let mut merged = current.clone();
                merged.extend(value.iter().map(|(k, v)| (k.clone(), v.clone())));
                Some(Value::Object(merged))
            }
            _ => None,
        }
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Object(_) | Value::Array(_))
}
