//! Data converters and representation markers.

use tracing::debug;

use super::Context;
use crate::error::ErrorKind;
use crate::metadata::{Annotation, TypeRef, TypeShape};
use crate::schema::{Conversion, DataType, Field, FieldKind, Representation};
use crate::value::{ScalarType, Value};

impl Context<'_> {
    /// Apply the converter or representation marker of a member, if any.
    ///
    /// Runs before any constraint or default of the member is evaluated, so
    /// that those are checked against the stored domain.
    pub(crate) fn apply_conversions(
        &self,
        field: &mut Field,
        annotations: &[Annotation],
    ) -> Result<(), ErrorKind> {
        let mut markers: Vec<&Annotation> = Vec::new();
        for annotation in annotations {
            let duplicate = markers.iter().any(|m| same_marker(m, annotation));
            if matches!(
                annotation,
                Annotation::Convert(_) | Annotation::Numeric | Annotation::AsString
            ) && !duplicate
            {
                markers.push(annotation);
            }
        }
        let marker = match markers.as_slice() {
            [] => return Ok(()),
            [marker] => *marker,
            _ => return Err(ErrorKind::ConflictingConverters),
        };

        match marker {
            Annotation::Convert(decl) => {
                let label = field.kind_label();
                let declared = field.declared.non_nullable().clone();
                let leaf = field
                    .leaf_mut()
                    .ok_or(ErrorKind::InapplicableConverter("DataConverter", label))?;

                let converter = decl
                    .construct()
                    .map_err(|reason| ErrorKind::ConverterConstruction {
                        converter: decl.name.clone(),
                        reason,
                    })?;

                let source = converter.source();
                if source.non_nullable() != &declared {
                    return Err(ErrorKind::ConverterSourceMismatch {
                        converter: decl.name.clone(),
                        expected: source.to_string(),
                        found: declared.to_string(),
                    });
                }

                let target = converter.target();
                let data_type = self.stored_type(target.non_nullable()).ok_or_else(|| {
                    ErrorKind::ConverterTargetUnsupported {
                        converter: decl.name.clone(),
                        target: target.to_string(),
                    }
                })?;

                let invocation = |reason: String| ErrorKind::ConverterInvocation {
                    converter: decl.name.clone(),
                    reason,
                };
                if let Some(probe) = leaf.domain.probe() {
                    let stored = converter.convert(&probe).map_err(invocation)?;
                    if !stored.is_null() && data_type.normalize(&stored).is_none() {
                        return Err(invocation(format!(
                            "produced {}, which is not a value of {}",
                            stored, data_type
                        )));
                    }
                    converter.revert(&stored).map_err(invocation)?;
                }

                debug!(converter = %decl.name, source = %source, target = %target, "converter bound");
                leaf.conversion = Some(Conversion::new(decl.name.clone(), converter));
                leaf.data_type = data_type;
            }
            Annotation::Numeric | Annotation::AsString => {
                let numeric = matches!(marker, Annotation::Numeric);
                let label = field.kind_label();
                let FieldKind::Enumeration(leaf) = &mut field.kind else {
                    return Err(ErrorKind::InapplicableConverter(marker.label(), label));
                };
                let DataType::Enumeration { decl, .. } = &leaf.domain else {
                    return Err(ErrorKind::InapplicableConverter(marker.label(), label));
                };
                let decl = decl.clone();

                let allowed: Vec<Value> = if numeric {
                    leaf.representation = Representation::Numeric;
                    leaf.data_type = DataType::Scalar(decl.underlying);
                    decl.variants
                        .iter()
                        .filter_map(|v| decl.underlying.normalize(&Value::Int(v.value)))
                        .collect()
                } else {
                    leaf.representation = Representation::Text;
                    leaf.data_type = DataType::Scalar(ScalarType::String);
                    decl.variants
                        .iter()
                        .map(|v| Value::String(v.name.clone()))
                        .collect()
                };
                if !decl.flags {
                    leaf.constraints.add_allowed(allowed);
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Stored data type of a converter target.
    pub(crate) fn stored_type(&self, ty: &TypeRef) -> Option<DataType> {
        match ty {
            TypeRef::Scalar(s) => Some(DataType::Scalar(*s)),
            TypeRef::Named(name) => match &self.model.get(name)?.shape {
                TypeShape::Enum(decl) => Some(DataType::Enumeration {
                    name: name.clone(),
                    decl: decl.clone(),
                }),
                _ => None,
            },
            _ => None,
        }
    }
}

fn same_marker(a: &Annotation, b: &Annotation) -> bool {
    match (a, b) {
        (Annotation::Numeric, Annotation::Numeric) => true,
        (Annotation::AsString, Annotation::AsString) => true,
        (Annotation::Convert(x), Annotation::Convert(y)) => x.name == y.name,
        _ => false,
    }
}
