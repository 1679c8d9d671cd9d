//! Macros that generate proptest test suites checking laws of stdlib traits.
//!
//! Used to check the ordering laws on the election rank key and similar
//! small `Ord`/`Eq`/`Hash` newtypes without hand-writing the same four or
//! five cases for each one.

/// Generate a suite of tests checking the laws of the [`Eq`] impl for the given type.
///
/// Generates three tests: reflexivity (`x == x`), symmetry (`(x == y) == (y
/// == x)`), and transitivity (`x == y && y == z => x == z`).
#[macro_export]
macro_rules! eq_laws {
    ($ty: ty) => {
        $crate::eq_laws!(
            #[strategy(::proptest::arbitrary::any::<$ty>())]
            $ty
        );
    };
    (#[$meta: meta] $ty: ty) => {
        #[allow(clippy::eq_op)]
        mod eq {
            use super::*;

            #[::test_strategy::proptest]
            fn reflexive(#[$meta] x: $ty) {
                assert!(x == x);
            }

            #[::test_strategy::proptest]
            fn symmetric(#[$meta] x: $ty, #[$meta] y: $ty) {
                assert_eq!(x == y, y == x);
            }

            #[::test_strategy::proptest]
            fn transitive(#[$meta] x: $ty, #[$meta] y: $ty, #[$meta] z: $ty) {
                if x == y && y == z {
                    assert!(x == z);
                }
            }
        }
    };
}

/// Generate a suite of tests checking the laws of the [`Ord`] impl for the given type.
#[macro_export]
macro_rules! ord_laws {
    ($ty: ty) => {
        $crate::ord_laws!(
            #[strategy(::proptest::arbitrary::any::<$ty>())]
            $ty
        );
    };
    (#[$meta: meta] $ty: ty) => {
        mod ord {
            use super::*;

            #[::test_strategy::proptest]
            fn partial_cmp_matches_cmp(#[$meta] x: $ty, #[$meta] y: $ty) {
                assert_eq!(x.partial_cmp(&y), Some(x.cmp(&y)));
            }

            #[::test_strategy::proptest]
            fn dual(#[$meta] x: $ty, #[$meta] y: $ty) {
                if x < y {
                    assert!(y > x);
                }
                if y < x {
                    assert!(x > y);
                }
            }

            #[::test_strategy::proptest]
            fn le_transitive(#[$meta] x: $ty, #[$meta] y: $ty, #[$meta] z: $ty) {
                if x < y && y < z {
                    assert!(x < z)
                }
            }

            #[::test_strategy::proptest]
            fn gt_transitive(#[$meta] x: $ty, #[$meta] y: $ty, #[$meta] z: $ty) {
                if x > y && y > z {
                    assert!(x > z)
                }
            }

            #[::test_strategy::proptest]
            fn trichotomy(#[$meta] x: $ty, #[$meta] y: $ty) {
                let less = x < y;
                let greater = x > y;
                let eq = x == y;

                if less {
                    assert!(!greater);
                    assert!(!eq);
                }
                if greater {
                    assert!(!less);
                    assert!(!eq);
                }
                if eq {
                    assert!(!less);
                    assert!(!greater);
                }
            }
        }
    };
}

/// Generate a test checking that the [`std::hash::Hash`] impl for the given type agrees with its
/// [`Eq`] impl: equal values must hash equally.
#[macro_export]
macro_rules! hash_laws {
    ($ty: ty) => {
        $crate::hash_laws!(
            #[strategy(::proptest::arbitrary::any::<$ty>())]
            $ty
        );
    };
    (#[$meta: meta] $ty: ty) => {
        mod hash {
            use super::*;

            fn hash_of<H: ::std::hash::Hash>(val: &H) -> u64 {
                use ::std::hash::Hasher;
                let mut hasher = ::std::collections::hash_map::DefaultHasher::new();
                val.hash(&mut hasher);
                hasher.finish()
            }

            #[::test_strategy::proptest]
            fn matches_eq(#[$meta] x: $ty, #[$meta] y: $ty) {
                if x == y {
                    assert_eq!(hash_of(&x), hash_of(&y));
                }
            }
        }
    };
}
