//! Compile-time binding declarations between result columns and struct fields.

use std::fmt;

use crate::error::Result;

use super::mapper::Cell;

/// Assignment function generated for one bound field.
pub type AssignFn<T> = fn(&mut T, &Cell<'_>) -> Result<()>;

/// One declared binding: a result field name and the struct field it fills.
pub struct Binding<T> {
    field_name: &'static str,
    property: &'static str,
    assign: AssignFn<T>,
}

impl<T> Binding<T> {
    pub const fn new(field_name: &'static str, property: &'static str, assign: AssignFn<T>) -> Self {
        Self {
            field_name,
            property,
            assign,
        }
    }

    /// Declared result field name, as written.
    pub fn field_name(&self) -> &'static str {
        self.field_name
    }

    /// Struct field name.
    pub fn property(&self) -> &'static str {
        self.property
    }

    /// Convert the cell and store it into the bound field.
    pub fn assign(&self, target: &mut T, cell: &Cell<'_>) -> Result<()> {
        (self.assign)(target, cell)
    }
}

impl<T> Clone for Binding<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Binding<T> {}

impl<T> fmt::Debug for Binding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("field_name", &self.field_name)
            .field("property", &self.property)
            .finish()
    }
}

/// A type that rows can be mapped into.
///
/// Usually implemented with [`data_bindings!`](crate::data_bindings).
pub trait DataBound: Default + 'static {
    /// Every declared binding, in declaration order.
    fn bindings() -> Vec<Binding<Self>>;
}

/// Declare the column bindings of a struct.
///
/// ```
/// use procbind::data_bindings;
///
/// #[derive(Debug, Default)]
/// struct Account {
///     id: i32,
///     name: Option<String>,
/// }
///
/// data_bindings!(Account {
///     id => "AccountId",
///     name => "Name",
/// });
/// ```
#[macro_export]
macro_rules! data_bindings {
    ($ty:ty { $($field:ident => $column:expr),* $(,)? }) => {
        impl $crate::mapping::DataBound for $ty {
            fn bindings() -> ::std::vec::Vec<$crate::mapping::Binding<Self>> {
                ::std::vec![
                    $(
                        $crate::mapping::Binding::new(
                            $column,
                            ::std::stringify!($field),
                            |target: &mut $ty, cell: &$crate::mapping::Cell<'_>| -> $crate::Result<()> {
                                target.$field = cell.convert()?;
                                ::std::result::Result::Ok(())
                            },
                        )
                    ),*
                ]
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Order {
        id: i64,
        note: String,
    }

    crate::data_bindings!(Order {
        id => "OrderId",
        note => "Note",
    });

    #[test]
    fn test_bindings_keep_declaration_order() {
        let bindings = Order::bindings();
        let names: Vec<_> = bindings
            .iter()
            .map(|b| (b.field_name(), b.property()))
            .collect();
        assert_eq!(names, vec![("OrderId", "id"), ("Note", "note")]);
    }

    #[test]
    fn test_debug_omits_function_pointer() {
        let bindings = Order::bindings();
        let rendered = format!("{:?}", bindings[0]);
        assert!(rendered.contains("OrderId"));
        assert!(rendered.contains("\"id\""));
    }
}
